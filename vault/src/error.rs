//! Collaborator error types.

/// Errors raised by vault, price-source and resolver implementations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("reverted: {0}")]
    Revert(String),

    #[error("unknown asset: {0}")]
    UnknownAsset(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, VaultError>;
