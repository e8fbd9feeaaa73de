//! Streaming uploads with in-flight digests, and replication status queries.
//!
//! # Architecture
//!
//! - [`data`] - Results handed back to callers
//! - [`core`] - Pure computations (throughput)
//! - `effects` - Connection pool, upload sink and pipeline, status fetcher
//!
//! Nothing here retries. Transport failures surface as
//! [`Error::Connect`], malformed responses as [`Error::Protocol`] or
//! [`Error::Parse`], and the caller decides what happens next.

pub mod core;
pub mod data;
mod effects;
mod error;

pub use crate::core::Throughput;
pub use data::{Retrieval, Upload, UploadOutcome};
pub use effects::{
    ByteStream, Connection, ConnectionPool, StatusFetcher, UploadSink, origin_key, retrieve, upload,
};
pub use error::{Error, Result, Stage};
