pub mod model;

type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("frame is missing an event type")]
    MissingEventType,

    #[error(transparent)]
    _ParseJson(#[from] serde_json::Error),
}
