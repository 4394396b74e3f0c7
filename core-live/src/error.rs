use thiserror::Error;

#[derive(Error, Debug)]
pub enum LiveError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("A live session is already attached")]
    AlreadyAttached,

    #[error("No active state to update")]
    NoActiveState,

    #[error("Checkpoint failed: {0}")]
    Checkpoint(String),
}

pub type Result<T> = std::result::Result<T, LiveError>;
