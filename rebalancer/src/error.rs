//! Error types for the rebalancer.

use std::path::PathBuf;

use detf::{Address, InvariantViolation, SchemaError};

/// All errors that can end a rebalance cycle or a CLI command.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("state file {path}: {reason}")]
    StateFile { path: PathBuf, reason: String },

    #[error("target allocation rejected: {0}")]
    Allocation(String),

    /// A price, balance or route read failed; nothing was submitted.
    #[error("data fetch failed for {what}: {reason}")]
    DataFetch { what: String, reason: String },

    #[error("invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("order data rejected: {0}")]
    Schema(#[from] SchemaError),

    #[error("batch has {legs} legs, limit is {max}")]
    TooManyLegs { legs: usize, max: usize },

    /// The vault rejected the batch; no leg took effect.
    #[error("submission reverted: {0}")]
    SubmissionRevert(String),

    #[error("vault {0} is already being rebalanced")]
    VaultBusy(Address),

    #[error("worker pool error: {0}")]
    Pool(String),

    #[error("execution aborted: {0}")]
    Aborted(String),

    #[error("audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn fetch(what: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::DataFetch {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    /// Process exit status for this error: 2 for a reverted submission,
    /// 0 for an operator abort, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::SubmissionRevert(_) => 2,
            Error::Aborted(_) => 0,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
