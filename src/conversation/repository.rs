use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::integration::http;
use crate::user;

use super::Id;
use super::model::{Conversation, ConversationDto};

#[async_trait]
pub trait ConversationRepository {
    async fn find_all(&self) -> super::Result<Vec<Conversation>>;

    async fn mark_as_read(&self, id: &Id) -> super::Result<()>;

    async fn init(
        &self,
        owner: &user::Id,
        counterpart: &user::Id,
        shipment_id: Option<&str>,
    ) -> super::Result<Conversation>;
}

pub struct HttpConversationRepository {
    http: http::Client,
}

impl HttpConversationRepository {
    pub fn new(http: http::Client) -> Self {
        Self { http }
    }
}

// The inbox endpoint has returned both a wrapped object and a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum InboxResponse {
    Wrapped { conversations: Vec<ConversationDto> },
    Bare(Vec<ConversationDto>),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitRequest<'a> {
    user_id: &'a user::Id,
    target_user_id: &'a user::Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    shipment_id: Option<&'a str>,
}

#[async_trait]
impl ConversationRepository for HttpConversationRepository {
    async fn find_all(&self) -> super::Result<Vec<Conversation>> {
        let response: InboxResponse = self.http.get("/chat/inbox").await?;

        let conversations = match response {
            InboxResponse::Wrapped { conversations } | InboxResponse::Bare(conversations) => {
                conversations
            }
        };

        Ok(conversations.into_iter().map(Conversation::from).collect())
    }

    async fn mark_as_read(&self, id: &Id) -> super::Result<()> {
        self.http.patch(&format!("/chat/{id}/read")).await?;
        Ok(())
    }

    async fn init(
        &self,
        owner: &user::Id,
        counterpart: &user::Id,
        shipment_id: Option<&str>,
    ) -> super::Result<Conversation> {
        let request = InitRequest {
            user_id: owner,
            target_user_id: counterpart,
            shipment_id,
        };

        let dto: ConversationDto = self.http.post("/chat/init", &request).await?;
        Ok(dto.into())
    }
}
