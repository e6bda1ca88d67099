use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Errors raised while constructing a change set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("unknown field: {0}")]
    UnknownField(String),
}
