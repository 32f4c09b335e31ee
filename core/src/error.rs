use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostPassError {
    #[error("Invalid configuration: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("Invalid transaction {index}: {reason}")]
    InvalidTransaction { index: usize, reason: String },

    #[error("Duplicate account id '{account_id}' in batch")]
    DuplicateAccount { account_id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PostPassResult<T> = Result<T, PostPassError>;
