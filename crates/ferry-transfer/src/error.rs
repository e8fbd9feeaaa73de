//! Error types for ferry-transfer.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connection to {url} failed: {source}")]
    Connect {
        url:    String,
        #[source]
        source: reqwest::Error,
    },

    #[error("protocol error from {url}: {reason}")]
    Protocol { url: String, reason: String },

    #[error("unparseable response body from {url}: {source}")]
    Parse {
        url:    String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("transfer to {url} failed in {stage}: {source}")]
    Transfer {
        url:    String,
        stage:  Stage,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Verify(#[from] ferry_verify::Error),
}

/// Pipeline stage a [`Error::Transfer`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Source,
    Sink,
    Response,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Source => write!(f, "source"),
            Stage::Sink => write!(f, "sink"),
            Stage::Response => write!(f, "response"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
