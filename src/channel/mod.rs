use std::sync::Arc;

use crate::event::model::Command;

pub mod client;
pub mod rooms;

type Result<T> = std::result::Result<T, Error>;

pub type Sender = Arc<dyn CommandSender + Send + Sync>;

// Outbound half of the event channel. Services hold this seam instead of the
// concrete connection so they can be exercised without a live socket.
pub trait CommandSender {
    fn is_connected(&self) -> bool;
    fn send(&self, command: Command) -> Result<()>;
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("timed out connecting to the event channel")]
    ConnectTimeout,
    #[error("event channel is closed")]
    Closed,

    #[error(transparent)]
    _Ws(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    _ParseJson(#[from] serde_json::Error),
}
