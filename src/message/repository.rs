use async_trait::async_trait;
use serde::Deserialize;

use crate::conversation;
use crate::integration::http;

use super::model::Message;

#[async_trait]
pub trait MessageRepository {
    async fn find_by_conversation_id(
        &self,
        id: &conversation::Id,
    ) -> super::Result<Vec<Message>>;
}

pub struct HttpMessageRepository {
    http: http::Client,
}

impl HttpMessageRepository {
    pub fn new(http: http::Client) -> Self {
        Self { http }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryResponse {
    Wrapped { messages: Vec<Message> },
    Bare(Vec<Message>),
}

#[async_trait]
impl MessageRepository for HttpMessageRepository {
    async fn find_by_conversation_id(
        &self,
        id: &conversation::Id,
    ) -> super::Result<Vec<Message>> {
        let response: HistoryResponse = self.http.get(&format!("/chat/{id}/messages")).await?;

        let messages = match response {
            HistoryResponse::Wrapped { messages } | HistoryResponse::Bare(messages) => messages,
        };

        Ok(messages)
    }
}
