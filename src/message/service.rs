use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::Stream;
use log::{debug, warn};
use tokio::sync::{RwLock, broadcast};

use crate::channel;
use crate::conversation;
use crate::event::model::{Command, MessageEvent};
use crate::user;

use super::model::Message;

const APPEND_BUFFER: usize = 256;

pub type MessageStream = Pin<Box<dyn Stream<Item = Message> + Send>>;

// One conversation is open at a time. `Loading` covers the history fetch;
// `Ready` holds the ordered message list that live events append to.
enum View {
    Idle,
    Loading { id: conversation::Id },
    Ready {
        id: conversation::Id,
        messages: Vec<Message>,
    },
}

#[derive(Clone)]
pub struct ChatService {
    repo: super::Repository,
    commands: channel::Sender,
    user: user::Id,
    view: Arc<RwLock<View>>,
    generation: Arc<AtomicU64>,
    appended: broadcast::Sender<Message>,
}

impl ChatService {
    pub fn new(repo: super::Repository, commands: channel::Sender, user: user::Id) -> Self {
        let (appended, _) = broadcast::channel(APPEND_BUFFER);

        Self {
            repo,
            commands,
            user,
            view: Arc::new(RwLock::new(View::Idle)),
            generation: Arc::new(AtomicU64::new(0)),
            appended,
        }
    }
}

impl ChatService {
    pub async fn load(&self, id: &conversation::Id) -> super::Result<()> {
        if !self.commands.is_connected() {
            debug!("skipping history load for {id}: channel not connected");
            return Ok(());
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.view.write().await = View::Loading { id: id.clone() };

        let history = self.repo.find_by_conversation_id(id).await;

        // A newer load or an unload happened while the fetch was in flight;
        // its result must not clobber the current view.
        let mut view = self.view.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("discarding stale history load for {id}");
            return Ok(());
        }

        let messages = match history {
            Ok(messages) => messages,
            Err(e) => {
                *view = View::Idle;
                return Err(e);
            }
        };

        *view = View::Ready {
            id: id.clone(),
            messages,
        };
        drop(view);

        self.commands.send(Command::JoinRoom {
            conversation_id: id.clone(),
        })?;

        Ok(())
    }

    pub async fn apply(&self, event: &MessageEvent) {
        let mut view = self.view.write().await;
        let View::Ready { id, messages } = &mut *view else {
            return;
        };

        if event.conversation_id() != Some(&*id) {
            return;
        }

        let message = Message::from(event);
        if let Some(new_id) = message.id()
            && messages.iter().any(|m| m.id() == Some(new_id))
        {
            debug!("skipping redelivered message {new_id}");
            return;
        }

        messages.push(message.clone());
        drop(view);

        let _ = self.appended.send(message);
    }

    pub async fn send(&self, content: &str) -> super::Result<()> {
        if content.trim().is_empty() {
            return Ok(());
        }

        let id = match &*self.view.read().await {
            View::Ready { id, .. } => id.clone(),
            _ => return Ok(()),
        };

        if !self.commands.is_connected() {
            debug!("skipping send for {id}: channel not connected");
            return Ok(());
        }

        // No optimistic append: the sent message comes back through the
        // live-append path once the server echoes it.
        self.commands.send(Command::SendMessage {
            conversation_id: id,
            content: content.to_owned(),
            sender_id: self.user.clone(),
        })?;

        Ok(())
    }

    pub async fn unload(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let previous = std::mem::replace(&mut *self.view.write().await, View::Idle);
        let (View::Loading { id } | View::Ready { id, .. }) = previous else {
            return;
        };

        if let Err(e) = self.commands.send(Command::LeaveRoom {
            conversation_id: id.clone(),
        }) {
            warn!("failed to leave room {id}: {e:?}");
        }
    }
}

impl ChatService {
    pub async fn messages(&self) -> Vec<Message> {
        match &*self.view.read().await {
            View::Ready { messages, .. } => messages.clone(),
            _ => Vec::new(),
        }
    }

    pub async fn is_loading(&self) -> bool {
        matches!(&*self.view.read().await, View::Loading { .. })
    }

    pub async fn conversation_id(&self) -> Option<conversation::Id> {
        match &*self.view.read().await {
            View::Loading { id } | View::Ready { id, .. } => Some(id.clone()),
            View::Idle => None,
        }
    }

    pub fn stream(&self) -> MessageStream {
        let mut appended = self.appended.subscribe();

        Box::pin(async_stream::stream! {
            loop {
                match appended.recv().await {
                    Ok(message) => yield message,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("message stream lagged, skipped {skipped} messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use futures::StreamExt;
    use tokio::sync::Notify;
    use tokio::time::sleep;

    use crate::channel::CommandSender;

    use super::super::Id;
    use super::*;

    struct RecordingSender {
        connected: AtomicBool,
        commands: Mutex<Vec<Command>>,
    }

    impl RecordingSender {
        fn new(connected: bool) -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicBool::new(connected),
                commands: Mutex::new(Vec::new()),
            })
        }

        fn recorded(&self) -> Vec<serde_json::Value> {
            self.commands
                .lock()
                .unwrap()
                .iter()
                .map(|command| serde_json::to_value(command).unwrap())
                .collect()
        }
    }

    impl CommandSender for RecordingSender {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn send(&self, command: Command) -> Result<(), crate::channel::Error> {
            self.commands.lock().unwrap().push(command);
            Ok(())
        }
    }

    struct FakeRepository {
        messages: Vec<Message>,
        calls: AtomicUsize,
        gate: Option<Notify>,
    }

    impl FakeRepository {
        fn new(messages: Vec<Message>) -> Arc<Self> {
            Arc::new(Self {
                messages,
                calls: AtomicUsize::new(0),
                gate: None,
            })
        }

        fn gated(messages: Vec<Message>) -> Arc<Self> {
            Arc::new(Self {
                messages,
                calls: AtomicUsize::new(0),
                gate: Some(Notify::new()),
            })
        }
    }

    #[async_trait]
    impl super::super::repository::MessageRepository for FakeRepository {
        async fn find_by_conversation_id(
            &self,
            _id: &conversation::Id,
        ) -> crate::message::Result<Vec<Message>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(self.messages.clone())
        }
    }

    fn history(conversation_id: &str, ids: &[&str]) -> Vec<Message> {
        ids.iter()
            .map(|id| {
                Message::new(
                    Some(Id::from(*id)),
                    conversation::Id::from(conversation_id),
                    user::Id::from("counterpart"),
                    format!("message {id}"),
                    Utc.timestamp_opt(10, 0).unwrap(),
                )
            })
            .collect()
    }

    fn event(conversation_id: &str, message_id: &str) -> MessageEvent {
        MessageEvent::new(
            Some(conversation::Id::from(conversation_id)),
            Some(user::Id::from("counterpart")),
            format!("live {message_id}"),
            Utc.timestamp_opt(20, 0).unwrap(),
        )
        .with_message_id(Id::from(message_id))
    }

    fn service(repo: Arc<FakeRepository>, sender: Arc<RecordingSender>) -> ChatService {
        ChatService::new(repo, sender, user::Id::from("me"))
    }

    #[tokio::test]
    async fn load_fetches_history_and_joins_the_room() {
        let repo = FakeRepository::new(history("c1", &["m1", "m2"]));
        let sender = RecordingSender::new(true);
        let chat = service(repo, sender.clone());

        chat.load(&conversation::Id::from("c1")).await.unwrap();

        assert_eq!(chat.messages().await.len(), 2);
        assert_eq!(
            sender.recorded(),
            [serde_json::json!({"type": "join_room", "conversation_id": "c1"})]
        );
    }

    #[tokio::test]
    async fn load_is_a_noop_while_disconnected() {
        let repo = FakeRepository::new(history("c1", &["m1"]));
        let sender = RecordingSender::new(false);
        let chat = service(repo.clone(), sender.clone());

        chat.load(&conversation::Id::from("c1")).await.unwrap();

        assert_eq!(repo.calls.load(Ordering::SeqCst), 0);
        assert!(sender.recorded().is_empty());
        assert!(chat.conversation_id().await.is_none());
    }

    #[tokio::test]
    async fn reloading_the_same_conversation_refetches() {
        let repo = FakeRepository::new(history("c1", &["m1"]));
        let chat = service(repo.clone(), RecordingSender::new(true));
        let id = conversation::Id::from("c1");

        chat.load(&id).await.unwrap();
        chat.load(&id).await.unwrap();

        assert_eq!(repo.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn live_events_append_in_arrival_order() {
        let repo = FakeRepository::new(history("c1", &["m1"]));
        let chat = service(repo, RecordingSender::new(true));
        chat.load(&conversation::Id::from("c1")).await.unwrap();

        chat.apply(&event("c1", "m2")).await;
        chat.apply(&event("c1", "m3")).await;

        let ids: Vec<_> = chat
            .messages()
            .await
            .iter()
            .map(|m| m.id().unwrap().as_str().to_owned())
            .collect();
        assert_eq!(ids, ["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn events_for_other_conversations_are_ignored() {
        let repo = FakeRepository::new(history("c1", &["m1"]));
        let chat = service(repo, RecordingSender::new(true));
        chat.load(&conversation::Id::from("c1")).await.unwrap();

        chat.apply(&event("c2", "m9")).await;

        assert_eq!(chat.messages().await.len(), 1);
    }

    #[tokio::test]
    async fn redelivered_messages_are_deduplicated() {
        let repo = FakeRepository::new(history("c1", &["m1"]));
        let chat = service(repo, RecordingSender::new(true));
        chat.load(&conversation::Id::from("c1")).await.unwrap();

        chat.apply(&event("c1", "m2")).await;
        chat.apply(&event("c1", "m2")).await;

        assert_eq!(chat.messages().await.len(), 2);
    }

    #[tokio::test]
    async fn send_emits_the_command_without_local_append() {
        let repo = FakeRepository::new(history("c1", &["m1"]));
        let sender = RecordingSender::new(true);
        let chat = service(repo, sender.clone());
        chat.load(&conversation::Id::from("c1")).await.unwrap();

        chat.send("hola").await.unwrap();

        assert_eq!(
            sender.recorded().last().unwrap(),
            &serde_json::json!({
                "type": "send_message",
                "conversation_id": "c1",
                "content": "hola",
                "sender_id": "me",
            })
        );
        // The echo has not arrived yet, so the list is unchanged.
        assert_eq!(chat.messages().await.len(), 1);
    }

    #[tokio::test]
    async fn send_requires_content_and_an_open_conversation() {
        let repo = FakeRepository::new(history("c1", &["m1"]));
        let sender = RecordingSender::new(true);
        let chat = service(repo, sender.clone());

        chat.send("hola").await.unwrap();
        assert!(sender.recorded().is_empty());

        chat.load(&conversation::Id::from("c1")).await.unwrap();
        chat.send("   ").await.unwrap();

        assert_eq!(sender.recorded().len(), 1, "only the join command went out");
    }

    #[tokio::test]
    async fn unload_leaves_the_room_and_resets_the_view() {
        let repo = FakeRepository::new(history("c1", &["m1"]));
        let sender = RecordingSender::new(true);
        let chat = service(repo, sender.clone());
        chat.load(&conversation::Id::from("c1")).await.unwrap();

        chat.unload().await;

        assert!(chat.conversation_id().await.is_none());
        assert_eq!(
            sender.recorded().last().unwrap(),
            &serde_json::json!({"type": "leave_room", "conversation_id": "c1"})
        );
    }

    #[tokio::test]
    async fn stale_history_fetch_is_discarded() {
        let repo = FakeRepository::gated(history("c1", &["m1"]));
        let chat = service(repo.clone(), RecordingSender::new(true));

        let pending = {
            let chat = chat.clone();
            tokio::spawn(async move { chat.load(&conversation::Id::from("c1")).await })
        };

        // Let the fetch reach the gate, then navigate away before it resolves.
        sleep(Duration::from_millis(10)).await;
        chat.unload().await;
        repo.gate.as_ref().unwrap().notify_one();

        pending.await.unwrap().unwrap();

        assert!(chat.conversation_id().await.is_none());
        assert!(chat.messages().await.is_empty());
    }

    #[tokio::test]
    async fn stream_yields_appended_messages() {
        let repo = FakeRepository::new(history("c1", &["m1"]));
        let chat = service(repo, RecordingSender::new(true));
        chat.load(&conversation::Id::from("c1")).await.unwrap();

        let mut stream = chat.stream();
        chat.apply(&event("c1", "m2")).await;

        let message = stream.next().await.expect("appended message");
        assert_eq!(message.id().unwrap().as_str(), "m2");
    }
}
