use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;

use crate::{Error, Hasher, Result};

/// Pass-through stream stage that hashes every chunk it forwards.
///
/// Chunks are yielded downstream unchanged and in order. The digest only
/// becomes available once the inner stream has reported end-of-stream;
/// asking for it earlier is an [`Error::IllegalState`].
pub struct DigestTap<S, H> {
    inner:   S,
    hasher:  Option<H>,
    bytes:   u64,
    drained: bool,
}

impl<S, H> DigestTap<S, H> {
    pub fn new(inner: S, hasher: H) -> Self {
        Self {
            inner,
            hasher: Some(hasher),
            bytes: 0,
            drained: false,
        }
    }

    /// Number of bytes forwarded so far.
    pub fn bytes(&self) -> u64 { self.bytes }

    /// Whether end-of-stream has been observed.
    pub fn is_drained(&self) -> bool { self.drained }
}

impl<S, H: Hasher> DigestTap<S, H> {
    /// Finalize the running digest. Can be called once, after the stream is drained.
    pub fn finalize(&mut self) -> Result<Vec<u8>> {
        if !self.drained {
            return Err(Error::IllegalState("digest requested before end of stream"));
        }
        let hasher = self
            .hasher
            .take()
            .ok_or(Error::IllegalState("digest already finalized"))?;
        Ok(hasher.finalize())
    }

    pub fn hex_digest(&mut self) -> Result<String> { self.finalize().map(hex::encode) }

    /// Finalize and compare against an expected hex digest.
    pub fn verify(&mut self, expected_hex: &str) -> Result<()> {
        let actual = self.hex_digest()?;
        if actual.eq_ignore_ascii_case(expected_hex) {
            Ok(())
        } else {
            Err(Error::Mismatch {
                expected: expected_hex.to_string(),
                actual,
            })
        }
    }
}

impl<S, E, H> Stream for DigestTap<S, H>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    H: Hasher + Unpin,
{
    type Item = std::result::Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.drained {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(hasher) = this.hasher.as_mut() {
                    hasher.update(&chunk);
                }
                this.bytes += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => {
                this.drained = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}
