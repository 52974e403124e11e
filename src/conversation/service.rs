use std::sync::Arc;

use log::{debug, error, warn};
use tokio::sync::{RwLock, watch};

use crate::channel::rooms::RoomSubscriber;
use crate::event::model::MessageEvent;
use crate::user;

use super::Id;
use super::model::Conversation;

// Holds the ordered inbox and reconciles it against both full refreshes and
// incremental message events. The server stays authoritative; everything here
// is a best-effort in-memory view rebuilt on every session.
#[derive(Clone)]
pub struct InboxService {
    repo: super::Repository,
    rooms: Arc<RoomSubscriber>,
    user: user::Id,
    conversations: Arc<RwLock<Vec<Conversation>>>,
    active: Arc<RwLock<Option<Id>>>,
    loading: Arc<watch::Sender<bool>>,
    updated: Arc<watch::Sender<u64>>,
}

impl InboxService {
    pub fn new(repo: super::Repository, rooms: Arc<RoomSubscriber>, user: user::Id) -> Self {
        let (loading, _) = watch::channel(false);
        let (updated, _) = watch::channel(0);

        Self {
            repo,
            rooms,
            user,
            conversations: Arc::new(RwLock::new(Vec::new())),
            active: Arc::new(RwLock::new(None)),
            loading: Arc::new(loading),
            updated: Arc::new(updated),
        }
    }
}

impl InboxService {
    pub async fn refresh(&self) -> super::Result<()> {
        self.loading.send_replace(true);
        let result = self.repo.find_all().await;
        self.loading.send_replace(false);

        let mut conversations = result?;
        // Stable sort on the recency key only, so equal timestamps keep their
        // relative order within a pass.
        conversations.sort_by(|a, b| b.recency().cmp(&a.recency()));

        *self.conversations.write().await = conversations;
        self.notify();

        self.sync_rooms().await;
        Ok(())
    }

    pub async fn apply(&self, event: &MessageEvent) {
        let Some(id) = event.conversation_id() else {
            debug!("message event without a conversation id, falling back to refresh");
            self.refresh_fallback().await;
            return;
        };

        let active = self.active.read().await.clone();

        let known = {
            let mut conversations = self.conversations.write().await;
            match conversations.iter().position(|c| c.id() == id) {
                None => false,
                Some(index) => {
                    let mut conversation = conversations.remove(index);
                    conversation.touch(event.content_preview(), event.created_at());

                    let own = event.sender().is_some_and(|sender| sender == &self.user);
                    if own || active.as_ref() == Some(id) {
                        conversation.reset_unread();
                    } else {
                        conversation.increment_unread();
                    }

                    conversations.insert(0, conversation);
                    true
                }
            }
        };

        if known {
            self.notify();
        } else {
            debug!("message event for unknown conversation {id}, falling back to refresh");
            self.refresh_fallback().await;
        }
    }

    pub async fn mark_as_read(&self, id: &Id) {
        {
            let mut conversations = self.conversations.write().await;
            if let Some(conversation) = conversations.iter_mut().find(|c| c.id() == id) {
                conversation.reset_unread();
            }
        }
        self.notify();

        // Read state is best-effort: the optimistic reset above stays even if
        // persisting it fails.
        let repo = self.repo.clone();
        let id = id.clone();
        tokio::spawn(async move {
            if let Err(e) = repo.mark_as_read(&id).await {
                warn!("failed to persist read state for {id}: {e:?}");
            }
        });
    }

    pub async fn enter(&self, id: &Id) {
        *self.active.write().await = Some(id.clone());
        self.mark_as_read(id).await;
    }

    pub async fn leave(&self) {
        *self.active.write().await = None;
    }

    pub async fn init(
        &self,
        counterpart: &user::Id,
        shipment_id: Option<&str>,
    ) -> super::Result<Conversation> {
        if counterpart == &self.user {
            return Err(super::Error::SelfConversation);
        }

        self.repo.init(&self.user, counterpart, shipment_id).await
    }
}

impl InboxService {
    pub async fn sync_rooms(&self) {
        let conversations = self.conversations.read().await;
        for conversation in conversations.iter() {
            if let Err(e) = self.rooms.ensure_joined(conversation.id()).await {
                warn!("failed to join room {}: {e:?}", conversation.id());
            }
        }
    }

    pub async fn snapshot(&self) -> Vec<Conversation> {
        self.conversations.read().await.clone()
    }

    pub async fn clear(&self) {
        self.conversations.write().await.clear();
        *self.active.write().await = None;
        self.notify();
    }

    pub fn loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    pub fn updated(&self) -> watch::Receiver<u64> {
        self.updated.subscribe()
    }

    async fn refresh_fallback(&self) {
        if let Err(e) = self.refresh().await {
            error!("failed to refresh inbox: {e:?}");
        }
    }

    fn notify(&self) {
        self.updated.send_modify(|generation| *generation += 1);
    }
}
