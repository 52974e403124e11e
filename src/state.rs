use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::broadcast;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::channel::client::Channel;
use crate::channel::rooms::RoomSubscriber;
use crate::conversation::repository::HttpConversationRepository;
use crate::conversation::service::InboxService;
use crate::event::model::ChannelEvent;
use crate::integration::http;
use crate::message::repository::HttpMessageRepository;
use crate::message::service::ChatService;
use crate::user::model::UserInfo;
use crate::{channel, conversation, integration, message};

type Result<T> = std::result::Result<T, Error>;

// Session-scoped context: everything below lives exactly as long as one
// signed-in user. Constructed on sign-in, torn down on sign-out; nothing is
// shared across sessions.
pub struct Session {
    user: UserInfo,
    inbox: InboxService,
    chat: ChatService,
    channel: Arc<Channel>,
    rooms: Arc<RoomSubscriber>,
    cancel: CancellationToken,
}

impl Session {
    pub async fn open(config: &integration::Config, user: UserInfo) -> Result<Session> {
        let http = http::Client::new(config);
        let conversation_repo: conversation::Repository =
            Arc::new(HttpConversationRepository::new(http.clone()));
        let message_repo: message::Repository = Arc::new(HttpMessageRepository::new(http));

        let channel = Arc::new(Channel::open(config).await?);
        let sender: channel::Sender = channel.clone();
        let rooms = Arc::new(RoomSubscriber::new(sender.clone()));

        let inbox = InboxService::new(conversation_repo, rooms.clone(), user.id().clone());
        let chat = ChatService::new(message_repo, sender, user.id().clone());

        inbox.refresh().await?;

        let cancel = CancellationToken::new();
        tokio::spawn(dispatch(
            channel.subscribe(),
            inbox.clone(),
            chat.clone(),
            rooms.clone(),
            cancel.clone(),
        ));

        if let Some(period) = config.refresh_interval() {
            tokio::spawn(reconcile(inbox.clone(), period, cancel.clone()));
        }

        info!("session opened for {}", user.id());
        Ok(Session {
            user,
            inbox,
            chat,
            channel,
            rooms,
            cancel,
        })
    }

    pub const fn user(&self) -> &UserInfo {
        &self.user
    }

    pub const fn inbox(&self) -> &InboxService {
        &self.inbox
    }

    pub const fn chat(&self) -> &ChatService {
        &self.chat
    }

    pub fn connected(&self) -> tokio::sync::watch::Receiver<bool> {
        self.channel.connected()
    }

    pub async fn close(self) {
        self.cancel.cancel();
        self.channel.close();
        self.rooms.clear().await;
        self.inbox.clear().await;
        info!("session closed for {}", self.user.id());
    }
}

async fn dispatch(
    mut events: broadcast::Receiver<ChannelEvent>,
    inbox: InboxService,
    chat: ChatService,
    rooms: Arc<RoomSubscriber>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            event = events.recv() => match event {
                Ok(ChannelEvent::Connected) => inbox.sync_rooms().await,
                Ok(ChannelEvent::Disconnected) => {
                    warn!("event channel disconnected");
                    rooms.clear().await;
                }
                Ok(ChannelEvent::Message(event)) => {
                    chat.apply(&event).await;
                    inbox.apply(&event).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("event dispatch lagged, skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    debug!("session dispatch stopped");
}

// Optimistic read state is never rolled back, so an optional timer re-syncs
// the whole inbox to keep client and server from diverging indefinitely.
async fn reconcile(inbox: InboxService, period: Duration, cancel: CancellationToken) {
    let mut timer = interval(period);
    timer.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = timer.tick() => {
                if let Err(e) = inbox.refresh().await {
                    warn!("periodic inbox refresh failed: {e:?}");
                }
            }
        }
    }

    debug!("session reconciliation stopped");
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    _Conversation(#[from] conversation::Error),
    #[error(transparent)]
    _Channel(#[from] channel::Error),
}
