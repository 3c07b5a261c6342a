//! # agora-server
//!
//! Reference server for the agora chat room.
//!
//! - **REST API** (axum): health check and the message backlog
//! - **Live channel**: one WebSocket route fanning out presence counts and
//!   accepted messages to every connection
//! - **In-memory store**: messages are kept for the lifetime of the process

pub mod api;
pub mod config;
pub mod error;
pub mod room;
pub mod store;

pub use api::{build_router, serve, serve_listener, AppState};
pub use config::ServerConfig;
pub use error::ServerError;
pub use store::MessageStore;
