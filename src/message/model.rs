use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::event::model::MessageEvent;
use crate::{conversation, user};

use super::Id;

#[derive(Clone, Debug, Deserialize)]
pub struct Message {
    #[serde(default)]
    id: Option<Id>,
    #[serde(
        default,
        alias = "conversationId",
        alias = "room"
    )]
    conversation_id: Option<conversation::Id>,
    #[serde(default, rename = "senderId", alias = "sender_id")]
    sender: Option<user::Id>,
    #[serde(default, alias = "message")]
    content: String,
    #[serde(default, alias = "createdAt", alias = "timestamp")]
    created_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(
        id: Option<Id>,
        conversation_id: conversation::Id,
        sender: user::Id,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            conversation_id: Some(conversation_id),
            sender: Some(sender),
            content: content.into(),
            created_at: Some(created_at),
        }
    }

    pub const fn id(&self) -> Option<&Id> {
        self.id.as_ref()
    }

    pub const fn conversation_id(&self) -> Option<&conversation::Id> {
        self.conversation_id.as_ref()
    }

    pub const fn sender(&self) -> Option<&user::Id> {
        self.sender.as_ref()
    }

    pub fn content(&self) -> &str {
        self.content.as_str()
    }

    pub const fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

impl From<&MessageEvent> for Message {
    fn from(event: &MessageEvent) -> Self {
        Self {
            id: event.message_id().cloned(),
            conversation_id: event.conversation_id().cloned(),
            sender: event.sender().cloned(),
            content: event.content().to_owned(),
            created_at: Some(event.created_at()),
        }
    }
}
