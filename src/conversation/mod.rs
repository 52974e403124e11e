use std::fmt::Display;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub mod model;
pub mod repository;
pub mod service;

type Result<T> = std::result::Result<T, Error>;

pub type Repository = Arc<dyn repository::ConversationRepository + Send + Sync>;

// Conversation identifiers are opaque and server-issued. Some backends send
// them as numbers, so they are normalized to strings on the way in.
#[derive(Clone, Debug, Serialize, Hash, PartialEq, Eq)]
pub struct Id(String);

impl Id {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Id {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

impl From<String> for Id {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Id, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        crate::event::model::string_or_number(deserializer).map(Id)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("cannot open a conversation with yourself")]
    SelfConversation,

    #[error(transparent)]
    _Integration(#[from] crate::integration::Error),
}
