use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures_util::Stream;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use url::Url;

use crate::core::Throughput;
use crate::data::UploadOutcome;
use crate::effects::pool::{Connection, ConnectionPool, parse_url};
use crate::error::{Error, Result, Stage};

type Completion = std::result::Result<(StatusCode, Bytes, Instant), reqwest::Error>;

/// Request body fed from the sink's channel.
///
/// The first poll means the transport has a live connection and started
/// sending the request; that moment is reported through `connected`.
///
/// The body only ends cleanly once `complete` is set. A channel that closes
/// without it yields an error, so the transport aborts the request instead
/// of delivering a truncated object.
struct BodyStream {
    chunks:    mpsc::Receiver<io::Result<Bytes>>,
    complete:  Arc<AtomicBool>,
    connected: Option<oneshot::Sender<Instant>>,
    done:      bool,
}

impl Stream for BodyStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(connected) = this.connected.take() {
            let _ = connected.send(Instant::now());
        }
        if this.done {
            return Poll::Ready(None);
        }

        match this.chunks.poll_recv(cx) {
            Poll::Ready(Some(Err(e))) => {
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) if !this.complete.load(Ordering::Acquire) => {
                this.done = true;
                Poll::Ready(Some(Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "upload abandoned before the end of the source",
                ))))
            }
            other => other,
        }
    }
}

/// Write end of one streaming `POST`.
///
/// [`UploadSink::open`] starts the request immediately and only returns
/// once the connection is up, so every write lands in the request body of
/// a live request. Writes wait while the transport is not ready for more
/// bytes; [`UploadSink::finish`] closes the body and waits for the full
/// JSON response.
///
/// A sink dropped before `finish` returns aborts the request, and the
/// server sees a broken body rather than a complete one.
pub struct UploadSink {
    url:          Url,
    pool:         ConnectionPool,
    connection:   Option<Connection>,
    sender:       Option<mpsc::Sender<io::Result<Bytes>>>,
    complete:     Arc<AtomicBool>,
    response:     JoinHandle<Completion>,
    connected_at: Instant,
    bytes:        u64,
}

impl UploadSink {
    pub async fn open(pool: &ConnectionPool, url: &str) -> Result<Self> {
        let url = parse_url(url)?;
        let connection = pool.acquire(&url)?;

        let (sender, chunks) = mpsc::channel(1);
        let (connected_tx, connected_rx) = oneshot::channel();
        let complete = Arc::new(AtomicBool::new(false));
        let body = BodyStream {
            chunks,
            complete: Arc::clone(&complete),
            connected: Some(connected_tx),
            done: false,
        };

        let request = connection
            .client()
            .post(url.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(reqwest::Body::wrap_stream(body));

        let mut response = tokio::spawn(async move {
            let response = request.send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok((status, body, Instant::now()))
        });

        let connected_at = match connected_rx.await {
            Ok(at) => at,
            Err(_) => {
                // Request ended before the body was ever polled.
                return Err(Self::early_completion(&url, (&mut response).await));
            }
        };
        tracing::debug!(url = %url, connection = connection.id(), "upload connected");

        Ok(Self {
            url,
            pool: pool.clone(),
            connection: Some(connection),
            sender: Some(sender),
            complete,
            response,
            connected_at,
            bytes: 0,
        })
    }

    /// Append a chunk to the request body.
    pub async fn write(&mut self, chunk: Bytes) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let len = chunk.len() as u64;

        let Some(sender) = self.sender.as_ref() else {
            return Err(self.closed());
        };
        if sender.send(Ok(chunk)).await.is_err() {
            // Receiver dropped: the request is over, find out why.
            self.sender = None;
            let completion = (&mut self.response).await;
            return Err(Self::early_completion(&self.url, completion));
        }

        self.bytes += len;
        Ok(())
    }

    /// Fail the request body with `error` so the server never sees the
    /// upload as complete.
    pub fn abort(mut self, error: io::Error) {
        tracing::debug!(url = %self.url, error = %error, "aborting upload");
        if let Some(sender) = self.sender.take() {
            // With the channel full, closing it unfinished fails the body too.
            let _ = sender.try_send(Err(error));
        }
    }

    /// Bytes accepted into the request body so far.
    pub fn bytes(&self) -> u64 { self.bytes }

    pub fn url(&self) -> &Url { &self.url }

    /// Close the body, wait for the response and parse it as JSON.
    ///
    /// Timing runs from connect to the last response byte. The connection
    /// goes back to the pool only when this succeeds.
    pub async fn finish(mut self) -> Result<UploadOutcome> {
        self.complete.store(true, Ordering::Release);
        drop(self.sender.take());

        let (status, body, completed_at) = match (&mut self.response).await {
            Ok(Ok(completion)) => completion,
            Ok(Err(source)) => {
                return Err(Error::Connect {
                    url: self.url.to_string(),
                    source,
                });
            }
            Err(join) => {
                return Err(Error::Transfer {
                    url:    self.url.to_string(),
                    stage:  Stage::Response,
                    source: io::Error::other(join),
                });
            }
        };

        if !status.is_success() {
            tracing::warn!(url = %self.url, status = status.as_u16(), "upload returned non-success status");
        }

        let response = serde_json::from_slice(&body).map_err(|source| Error::Parse {
            url: self.url.to_string(),
            source,
        })?;

        if let Some(connection) = self.connection.take() {
            self.pool.release(connection);
        }

        let throughput = Throughput::measure(
            self.bytes,
            completed_at.saturating_duration_since(self.connected_at),
        );
        Ok(UploadOutcome {
            response,
            bytes: throughput.bytes,
            milliseconds: throughput.milliseconds,
            bytes_per_second: throughput.bytes_per_second,
        })
    }

    fn closed(&self) -> Error {
        Error::Transfer {
            url:    self.url.to_string(),
            stage:  Stage::Sink,
            source: io::Error::new(io::ErrorKind::BrokenPipe, "request body already closed"),
        }
    }

    fn early_completion(
        url: &Url,
        completion: std::result::Result<Completion, tokio::task::JoinError>,
    ) -> Error {
        match completion {
            Ok(Err(source)) => Error::Connect {
                url: url.to_string(),
                source,
            },
            Ok(Ok((status, _, _))) => Error::Protocol {
                url:    url.to_string(),
                reason: format!("server responded with {status} before the upload completed"),
            },
            Err(join) => Error::Transfer {
                url:    url.to_string(),
                stage:  Stage::Sink,
                source: io::Error::other(join),
            },
        }
    }
}

impl Drop for UploadSink {
    fn drop(&mut self) {
        // No-op once the response has arrived.
        self.response.abort();
    }
}
