use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use url::Url;

use crate::error::{Error, Result};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A request-capable connection to one origin.
///
/// Not `Clone`: whoever holds a `Connection` owns it exclusively until it
/// is handed back with [`ConnectionPool::release`] or dropped.
#[derive(Debug)]
pub struct Connection {
    id:     u64,
    origin: String,
    client: reqwest::Client,
}

impl Connection {
    /// Open a new, unpooled connection to the origin of `url`.
    pub fn open(url: &Url) -> Result<Self> {
        let origin = origin_key(url)?;
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(1)
            .build()
            .map_err(|source| Error::Connect {
                url: origin.clone(),
                source,
            })?;

        Ok(Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            origin,
            client,
        })
    }

    pub fn id(&self) -> u64 { self.id }

    /// `scheme://host[:port]` this connection talks to.
    pub fn origin(&self) -> &str { &self.origin }

    pub(crate) fn client(&self) -> &reqwest::Client { &self.client }
}

/// Per-origin free lists of idle connections.
///
/// Cloning the pool shares the same free lists. There is no size bound and
/// no health check on reuse: a connection that went bad fails the next
/// request issued through it, and that request's caller sees the error.
/// Connections are only returned after a request completed successfully,
/// so a failed one is dropped rather than handed out again.
#[derive(Clone, Debug, Default)]
pub struct ConnectionPool {
    idle: Arc<Mutex<HashMap<String, Vec<Connection>>>>,
}

impl ConnectionPool {
    pub fn new() -> Self { Self::default() }

    /// Check out an idle connection for the origin of `url`, or open one.
    pub fn acquire(&self, url: &Url) -> Result<Connection> {
        let key = origin_key(url)?;
        let pooled = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&key)
            .and_then(Vec::pop);

        match pooled {
            Some(connection) => {
                tracing::trace!(origin = %key, connection = connection.id, "reusing pooled connection");
                Ok(connection)
            }
            None => {
                let connection = Connection::open(url)?;
                tracing::debug!(origin = %key, connection = connection.id, "opened connection");
                Ok(connection)
            }
        }
    }

    /// Check a connection back in under its own origin.
    pub fn release(&self, connection: Connection) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(connection.origin.clone())
            .or_default()
            .push(connection);
    }

    /// Number of idle connections held for the origin of `url`.
    pub fn idle_count(&self, url: &Url) -> usize {
        let Ok(key) = origin_key(url) else {
            return 0;
        };
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .map_or(0, Vec::len)
    }
}

/// Pool key: scheme and authority only, never path or query.
pub fn origin_key(url: &Url) -> Result<String> {
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::InvalidUrl {
            url:    url.to_string(),
            reason: "expected an http(s) URL with a host".to_string(),
        });
    }
    Ok(url.origin().ascii_serialization())
}

pub(crate) fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| Error::InvalidUrl {
        url:    url.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url { Url::parse(s).unwrap() }

    #[test]
    fn test_origin_key_ignores_path_and_query() {
        assert_eq!(
            origin_key(&url("http://storage.test:8080/v0/blob?x=1")).unwrap(),
            "http://storage.test:8080"
        );
        assert_eq!(
            origin_key(&url("https://storage.test/other")).unwrap(),
            "https://storage.test"
        );
    }

    #[test]
    fn test_origin_key_rejects_non_http() {
        assert!(matches!(
            origin_key(&url("file:///tmp/x")),
            Err(Error::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_sequential_acquire_reuses_connection() {
        let pool = ConnectionPool::new();
        let first = pool.acquire(&url("http://a.test/v0/blob")).unwrap();
        let first_id = first.id();
        pool.release(first);

        let second = pool.acquire(&url("http://a.test/v0/other/status")).unwrap();
        assert_eq!(second.id(), first_id);
        assert_eq!(pool.idle_count(&url("http://a.test/")), 0);
    }

    #[test]
    fn test_release_is_scoped_to_origin() {
        let pool = ConnectionPool::new();
        let a = pool.acquire(&url("http://a.test/")).unwrap();
        let a_id = a.id();
        pool.release(a);

        let b = pool.acquire(&url("http://b.test/")).unwrap();
        assert_ne!(b.id(), a_id);
        assert_eq!(b.origin(), "http://b.test");
        assert_eq!(pool.idle_count(&url("http://a.test/")), 1);
    }

    #[test]
    fn test_concurrent_checkouts_get_distinct_connections() {
        let pool = ConnectionPool::new();
        let first = pool.acquire(&url("http://a.test/")).unwrap();
        pool.release(first);

        let one = pool.acquire(&url("http://a.test/")).unwrap();
        let two = pool.acquire(&url("http://a.test/")).unwrap();
        assert_ne!(one.id(), two.id());
    }

    #[test]
    fn test_cloned_pool_shares_free_lists() {
        let pool = ConnectionPool::new();
        let other = pool.clone();
        let conn = pool.acquire(&url("http://a.test/")).unwrap();
        let id = conn.id();
        other.release(conn);
        assert_eq!(pool.acquire(&url("http://a.test/")).unwrap().id(), id);
    }
}
