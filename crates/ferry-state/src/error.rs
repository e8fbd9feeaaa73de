//! Error types for ferry-state.

use std::path::PathBuf;

use thiserror::Error;

/// A status report that cannot be folded into its record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("status id does not match: got [{}], expected [{expected}]", .actual.as_deref().unwrap_or("<none>"))]
    IdentityMismatch {
        expected: String,
        actual:   Option<String>,
    },

    #[error("malformed replica in status for {id}: {reason}")]
    MalformedReplica { id: String, reason: String },
}

impl ReconcileError {
    /// Identity mismatches mean the remote service or the local records are
    /// corrupt; nothing further should be reconciled.
    pub fn is_fatal(&self) -> bool { matches!(self, Self::IdentityMismatch { .. }) }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("state file '{path}' is not valid: {source}")]
    Corrupt {
        path:   PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("record {0} already exists")]
    DuplicateId(String),

    #[error("state entry '{key}' holds record '{id}'")]
    MisfiledRecord { key: String, id: String },

    #[error(transparent)]
    Fs(#[from] ferry_fs::Error),

    #[error(transparent)]
    Transfer(#[from] ferry_transfer::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
