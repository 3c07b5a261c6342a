// Wire types shared by the Agora client and server.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use protocol::{decode_frame, decode_frame_bytes, LiveEvent, OutboundPayload, ServerFrame};
pub use types::{ChatMessage, MessageId, RoomSnapshot};
