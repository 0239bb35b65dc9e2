use thiserror::Error;

/// Errors surfaced by publish operations.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("notification channel failed: {0}")]
    Channel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PublishResult<T> = Result<T, PublishError>;
