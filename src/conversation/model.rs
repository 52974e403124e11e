use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::Id;

#[derive(Clone, Debug)]
pub struct Conversation {
    id: Id,
    counterpart_name: String,
    last_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    unread_count: u32,
}

impl Conversation {
    pub fn new(id: Id, counterpart_name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            counterpart_name: counterpart_name.into(),
            last_message: None,
            created_at,
            updated_at: None,
            unread_count: 0,
        }
    }

    pub fn with_last_message(mut self, preview: &str) -> Self {
        self.last_message = Some(preview.to_owned());
        self
    }

    pub fn with_updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }

    pub fn with_unread(mut self, count: u32) -> Self {
        self.unread_count = count;
        self
    }
}

impl Conversation {
    pub const fn id(&self) -> &Id {
        &self.id
    }

    pub fn counterpart_name(&self) -> &str {
        self.counterpart_name.as_str()
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub const fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub const fn unread_count(&self) -> u32 {
        self.unread_count
    }

    pub fn recency(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}

impl Conversation {
    pub(crate) fn touch(&mut self, preview: Option<&str>, at: DateTime<Utc>) {
        if let Some(preview) = preview {
            self.last_message = Some(preview.to_owned());
        }
        self.updated_at = Some(at);
    }

    pub(crate) fn reset_unread(&mut self) {
        self.unread_count = 0;
    }

    pub(crate) fn increment_unread(&mut self) {
        self.unread_count = self.unread_count.saturating_add(1);
    }
}

// Wire shape of a conversation as the backend returns it. Field spellings
// have varied across backend revisions; all known ones are accepted here.
#[derive(Deserialize)]
pub struct ConversationDto {
    id: Id,
    #[serde(
        default,
        rename = "otherParticipantName",
        alias = "other_participant_name"
    )]
    other_participant_name: Option<String>,
    #[serde(default, alias = "last_message_content", alias = "lastMessage")]
    last_message: Option<String>,
    #[serde(default, alias = "createdAt")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "updatedAt")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        rename = "unreadCount",
        alias = "unread_count",
        alias = "unreadMessages",
        alias = "unread_messages"
    )]
    unread_count: Option<u32>,
}

impl From<ConversationDto> for Conversation {
    fn from(dto: ConversationDto) -> Self {
        Self {
            id: dto.id,
            counterpart_name: dto.other_participant_name.unwrap_or_default(),
            last_message: dto.last_message,
            created_at: dto.created_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            updated_at: dto.updated_at,
            unread_count: dto.unread_count.unwrap_or_default(),
        }
    }
}
