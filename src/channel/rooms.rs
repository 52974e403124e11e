use std::collections::HashSet;

use tokio::sync::RwLock;

use crate::conversation;
use crate::event::model::Command;

use super::Sender;

// Tracks which rooms this connection has been subscribed to, so the join
// command goes out at most once per room per connection lifetime. Membership
// does not survive a reconnect, so the set is cleared on disconnect and
// re-derived from the inbox.
pub struct RoomSubscriber {
    sender: Sender,
    joined: RwLock<HashSet<conversation::Id>>,
}

impl RoomSubscriber {
    pub fn new(sender: Sender) -> Self {
        Self {
            sender,
            joined: RwLock::new(HashSet::new()),
        }
    }
}

impl RoomSubscriber {
    pub async fn ensure_joined(&self, id: &conversation::Id) -> super::Result<()> {
        if !self.sender.is_connected() {
            return Ok(());
        }

        let mut joined = self.joined.write().await;
        if joined.contains(id) {
            return Ok(());
        }

        self.sender.send(Command::JoinRoom {
            conversation_id: id.clone(),
        })?;
        joined.insert(id.clone());

        Ok(())
    }

    pub async fn is_joined(&self, id: &conversation::Id) -> bool {
        self.joined.read().await.contains(id)
    }

    pub async fn clear(&self) {
        self.joined.write().await.clear();
    }
}
