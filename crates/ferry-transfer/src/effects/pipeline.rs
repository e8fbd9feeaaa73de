use std::io;
use std::pin::Pin;

use bytes::Bytes;
use ferry_verify::{DigestTap, Sha256Hasher};
use futures_util::{Stream, StreamExt};

use crate::data::Upload;
use crate::effects::pool::ConnectionPool;
use crate::effects::sink::UploadSink;
use crate::error::{Error, Result, Stage};

/// Readable object content.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'static>>;

/// Stream `source` to `url` through a SHA-256 tap.
///
/// The source is only polled after the previous chunk has been accepted by
/// the sink, so a slow remote end slows down reads instead of growing a
/// buffer. A failure in any stage fails the whole upload and aborts the
/// request, so the server never stores a prefix of the object. Nothing is
/// resumable; the caller starts over from the beginning of the source.
pub async fn upload(pool: &ConnectionPool, url: &str, source: ByteStream) -> Result<Upload> {
    let mut sink = UploadSink::open(pool, url).await?;
    let mut tap = DigestTap::new(source, Sha256Hasher::new());

    while let Some(chunk) = tap.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(source) => {
                sink.abort(io::Error::new(source.kind(), source.to_string()));
                return Err(Error::Transfer {
                    url: url.to_string(),
                    stage: Stage::Source,
                    source,
                });
            }
        };
        sink.write(chunk).await?;
    }

    let digest = tap.hex_digest()?;
    let outcome = sink.finish().await?;

    Ok(Upload {
        url: url.to_string(),
        digest,
        response: outcome.response,
        bytes: outcome.bytes,
        milliseconds: outcome.milliseconds,
        bytes_per_second: outcome.bytes_per_second,
    })
}
