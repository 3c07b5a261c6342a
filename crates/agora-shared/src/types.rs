use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ProtocolError;

/// Server-assigned message identifier.
pub type MessageId = i64;

/// Message backlog loaded once at join time, oldest first.
pub type RoomSnapshot = Vec<ChatMessage>;

/// A chat message as broadcast by the server.
///
/// Messages are immutable once received. Their position in the room is the
/// order in which they arrived; `created_at` is only displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Absent for items the server has not identified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    pub nickname: String,
    pub content: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Whether this message was authored under `nickname`.
    pub fn is_from(&self, nickname: &str) -> bool {
        self.nickname.trim() == nickname.trim()
    }

    /// Reject messages with a blank nickname or blank content.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.nickname.trim().is_empty() {
            return Err(ProtocolError::InvalidMessage("empty nickname"));
        }
        if self.content.trim().is_empty() {
            return Err(ProtocolError::InvalidMessage("empty content"));
        }
        Ok(())
    }

    /// `HH:MM` label in the local time zone.
    pub fn time_label(&self) -> String {
        self.time_label_in(&chrono::Local)
    }

    pub fn time_label_in<Tz>(&self, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        self.created_at.with_timezone(tz).format("%H:%M").to_string()
    }
}

/// Parse a server timestamp.
///
/// Accepts RFC 3339 with an offset as well as naive ISO-8601 values, which
/// the server's storage layer emits for UTC instants.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(_) => raw.parse::<NaiveDateTime>().map(|naive| naive.and_utc()),
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339_and_naive() {
        let with_offset = parse_timestamp("2024-05-01T12:30:00+02:00").unwrap();
        assert_eq!(with_offset.to_rfc3339(), "2024-05-01T10:30:00+00:00");

        let naive = parse_timestamp("2024-05-01T10:30:00.123456").unwrap();
        assert_eq!(naive.timestamp(), with_offset.timestamp());

        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_message_without_id() {
        let json = r#"{"nickname":"A","content":"hi","created_at":"2024-05-01T10:30:00Z"}"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, None);
        assert_eq!(msg.nickname, "A");
    }

    #[test]
    fn test_is_from_ignores_surrounding_whitespace() {
        let msg = ChatMessage {
            id: Some(1),
            nickname: "alice".into(),
            content: "hi".into(),
            created_at: Utc::now(),
        };
        assert!(msg.is_from(" alice "));
        assert!(!msg.is_from("bob"));
    }

    #[test]
    fn test_validate_rejects_blank_fields() {
        let mut msg = ChatMessage {
            id: Some(1),
            nickname: "alice".into(),
            content: "hi".into(),
            created_at: Utc::now(),
        };
        assert!(msg.validate().is_ok());

        msg.content = " \n ".into();
        assert!(matches!(
            msg.validate(),
            Err(ProtocolError::InvalidMessage("empty content"))
        ));

        msg.content = "hi".into();
        msg.nickname = String::new();
        assert!(matches!(
            msg.validate(),
            Err(ProtocolError::InvalidMessage("empty nickname"))
        ));
    }

    #[test]
    fn test_time_label() {
        let msg = ChatMessage {
            id: Some(1),
            nickname: "alice".into(),
            content: "hi".into(),
            created_at: parse_timestamp("2024-05-01T09:05:59Z").unwrap(),
        };
        assert_eq!(msg.time_label_in(&Utc), "09:05");
    }
}
