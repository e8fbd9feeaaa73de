//! Network effects: pooled connections, streaming uploads, status queries.

mod pipeline;
mod pool;
mod retrieve;
mod sink;
mod status;

pub use pipeline::{ByteStream, upload};
pub use pool::{Connection, ConnectionPool, origin_key};
pub use retrieve::retrieve;
pub use sink::UploadSink;
pub use status::StatusFetcher;
