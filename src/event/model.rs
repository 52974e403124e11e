use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{conversation, message, user};

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Auth {
        token: String,
    },
    JoinRoom {
        conversation_id: conversation::Id,
    },
    LeaveRoom {
        conversation_id: conversation::Id,
    },
    SendMessage {
        conversation_id: conversation::Id,
        content: String,
        sender_id: user::Id,
    },
}

#[derive(Clone, Debug)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Message(MessageEvent),
}

// Canonical form of an inbound message event. Backends have shipped several
// field spellings over time; `from_payload` is the single place that knows
// about all of them.
#[derive(Clone, Debug)]
pub struct MessageEvent {
    conversation_id: Option<conversation::Id>,
    message_id: Option<message::Id>,
    sender: Option<user::Id>,
    content: String,
    created_at: DateTime<Utc>,
}

impl MessageEvent {
    pub fn new(
        conversation_id: Option<conversation::Id>,
        sender: Option<user::Id>,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            conversation_id,
            message_id: None,
            sender,
            content: content.into(),
            created_at,
        }
    }

    pub fn with_message_id(mut self, id: message::Id) -> Self {
        self.message_id = Some(id);
        self
    }

    pub const fn conversation_id(&self) -> Option<&conversation::Id> {
        self.conversation_id.as_ref()
    }

    pub const fn message_id(&self) -> Option<&message::Id> {
        self.message_id.as_ref()
    }

    pub const fn sender(&self) -> Option<&user::Id> {
        self.sender.as_ref()
    }

    pub fn content(&self) -> &str {
        self.content.as_str()
    }

    // An empty content field keeps the previous preview rather than blanking it.
    pub fn content_preview(&self) -> Option<&str> {
        match self.content.is_empty() {
            true => None,
            false => Some(self.content.as_str()),
        }
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl MessageEvent {
    pub fn from_payload(payload: &Value) -> Self {
        let conversation_id = first_id(payload, &["conversation_id", "conversationId", "room"])
            .map(conversation::Id::from);
        let message_id =
            first_id(payload, &["id", "message_id", "messageId"]).map(message::Id::from);
        let sender = first_id(payload, &["senderId", "sender_id"]).map(user::Id::from);
        let content = first_str(payload, &["content", "message", "last_message", "last_message_content"])
            .unwrap_or_default();
        let created_at = first_timestamp(payload, &["created_at", "createdAt", "timestamp"])
            .unwrap_or_else(Utc::now);

        Self {
            conversation_id,
            message_id,
            sender,
            content,
            created_at,
        }
    }
}

pub fn decode(frame: &str) -> super::Result<Option<MessageEvent>> {
    let value: Value = serde_json::from_str(frame)?;
    let event_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(super::Error::MissingEventType)?;

    match event_type {
        "receive_message" => {
            let payload = value.get("payload").unwrap_or(&value);
            Ok(Some(MessageEvent::from_payload(payload)))
        }
        other => {
            debug!("ignoring {other} event");
            Ok(None)
        }
    }
}

fn first_id(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match payload.get(key) {
        Some(Value::String(raw)) if !raw.is_empty() => Some(raw.clone()),
        Some(Value::Number(raw)) => Some(raw.to_string()),
        _ => None,
    })
}

fn first_str(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match payload.get(key) {
        Some(Value::String(raw)) if !raw.is_empty() => Some(raw.clone()),
        _ => None,
    })
}

const EPOCH_MILLIS_CUTOFF: i64 = 100_000_000_000;

fn first_timestamp(payload: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter().find_map(|key| match payload.get(key) {
        Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|at| at.with_timezone(&Utc)),
        Some(Value::Number(raw)) => raw.as_i64().and_then(|epoch| {
            if epoch >= EPOCH_MILLIS_CUTOFF {
                Utc.timestamp_millis_opt(epoch).single()
            } else {
                Utc.timestamp_opt(epoch, 0).single()
            }
        }),
        _ => None,
    })
}

pub(crate) fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        String(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::String(raw) => raw,
        Raw::Number(raw) => raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_snake_case_message_frame() {
        let frame = json!({
            "type": "receive_message",
            "conversation_id": "conv-1",
            "sender_id": "user-2",
            "content": "hola",
            "created_at": "2024-03-01T10:00:00Z",
        })
        .to_string();

        let event = decode(&frame).unwrap().expect("message event");
        assert_eq!(event.conversation_id().unwrap().as_str(), "conv-1");
        assert_eq!(event.sender().unwrap().as_str(), "user-2");
        assert_eq!(event.content(), "hola");
        assert_eq!(event.created_at().timestamp(), 1_709_287_200);
    }

    #[test]
    fn decodes_camel_case_and_room_variants() {
        let frame = json!({
            "type": "receive_message",
            "room": "conv-7",
            "senderId": "user-9",
            "message": "cargo listo",
            "createdAt": "2024-03-01T10:00:00Z",
        })
        .to_string();

        let event = decode(&frame).unwrap().expect("message event");
        assert_eq!(event.conversation_id().unwrap().as_str(), "conv-7");
        assert_eq!(event.sender().unwrap().as_str(), "user-9");
        assert_eq!(event.content(), "cargo listo");
    }

    #[test]
    fn coerces_numeric_identifiers() {
        let frame = json!({
            "type": "receive_message",
            "conversationId": 42,
            "senderId": 7,
            "content": "ok",
        })
        .to_string();

        let event = decode(&frame).unwrap().expect("message event");
        assert_eq!(event.conversation_id().unwrap().as_str(), "42");
        assert_eq!(event.sender().unwrap().as_str(), "7");
    }

    #[test]
    fn event_without_conversation_id_is_kept_for_fallback() {
        let frame = json!({
            "type": "receive_message",
            "senderId": "user-1",
            "content": "hm",
        })
        .to_string();

        let event = decode(&frame).unwrap().expect("message event");
        assert!(event.conversation_id().is_none());
    }

    #[test]
    fn parses_epoch_timestamps_in_seconds_and_millis() {
        let seconds = json!({"type": "receive_message", "room": "c", "timestamp": 1_709_287_200});
        let millis =
            json!({"type": "receive_message", "room": "c", "timestamp": 1_709_287_200_000_i64});

        let from_seconds = decode(&seconds.to_string()).unwrap().unwrap();
        let from_millis = decode(&millis.to_string()).unwrap().unwrap();

        assert_eq!(from_seconds.created_at(), from_millis.created_at());
    }

    #[test]
    fn reads_payload_from_nested_object() {
        let frame = json!({
            "type": "receive_message",
            "payload": {"conversation_id": "conv-3", "content": "nested"},
        })
        .to_string();

        let event = decode(&frame).unwrap().expect("message event");
        assert_eq!(event.conversation_id().unwrap().as_str(), "conv-3");
        assert_eq!(event.content(), "nested");
    }

    #[test]
    fn ignores_unknown_event_types() {
        let frame = json!({"type": "user_typing", "room": "conv-1"}).to_string();
        assert!(decode(&frame).unwrap().is_none());
    }

    #[test]
    fn rejects_untyped_frames() {
        let frame = json!({"room": "conv-1"}).to_string();
        assert!(matches!(decode(&frame), Err(crate::event::Error::MissingEventType)));
    }

    #[test]
    fn commands_serialize_as_tagged_json() {
        let command = Command::JoinRoom {
            conversation_id: conversation::Id::from("conv-1"),
        };

        assert_eq!(
            serde_json::to_value(&command).unwrap(),
            json!({"type": "join_room", "conversation_id": "conv-1"})
        );

        let command = Command::SendMessage {
            conversation_id: conversation::Id::from("conv-1"),
            content: "hola".into(),
            sender_id: user::Id::from("user-1"),
        };

        assert_eq!(
            serde_json::to_value(&command).unwrap(),
            json!({
                "type": "send_message",
                "conversation_id": "conv-1",
                "content": "hola",
                "sender_id": "user-1",
            })
        );
    }
}
