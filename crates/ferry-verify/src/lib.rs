//! Content digests computed while bytes stream through a transfer.
//!
//! The [`DigestTap`] stage forwards chunks unchanged and feeds each one into
//! a [`Hasher`], so the digest of an upload or download is known the moment
//! the last byte has passed without buffering or re-reading the content.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use ferry_verify::{DigestTap, Sha256Hasher};
//! use futures_util::{StreamExt, stream};
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let source = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"hello world"))]);
//! let mut tap = DigestTap::new(source, Sha256Hasher::new());
//! while let Some(chunk) = tap.next().await {
//!     let _ = chunk.unwrap();
//! }
//! assert_eq!(tap.finalize().unwrap(), Sha256Hasher::digest(b"hello world"));
//! # });
//! ```

pub use self::error::{Error, Result};
pub use self::hasher::{Hasher, Sha256Hasher};
pub use self::tap::DigestTap;

mod error;
mod hasher;
mod tap;
