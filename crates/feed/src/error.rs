use thiserror::Error;

/// Errors raised while interpreting feed request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("Invalid embed level: {0}")]
    InvalidEmbed(String),

    #[error("Invalid read direction: {0}")]
    InvalidDirection(String),
}

pub type Result<T> = std::result::Result<T, FeedError>;
