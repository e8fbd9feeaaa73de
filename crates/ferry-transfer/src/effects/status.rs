use serde_json::Value;
use url::Url;

use crate::effects::pool::{ConnectionPool, parse_url};
use crate::error::{Error, Result};

/// Replication status queries against one storage service.
#[derive(Clone, Debug)]
pub struct StatusFetcher {
    pool:     ConnectionPool,
    base_url: Url,
}

impl StatusFetcher {
    pub fn new(pool: ConnectionPool, base_url: &str) -> Result<Self> {
        Ok(Self {
            pool,
            base_url: parse_url(base_url)?,
        })
    }

    /// `{base}/{id}/status`, with `id` escaped as a single path segment.
    pub fn status_url(&self, id: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl {
                url:    self.base_url.to_string(),
                reason: "cannot be a base URL".to_string(),
            })?
            .pop_if_empty()
            .push(id)
            .push("status");
        Ok(url)
    }

    /// Fetch the status document for `id` and return it verbatim.
    ///
    /// A non-200 answer is only logged: the service reports "not ready
    /// yet" with structured bodies on other codes. The body must still be
    /// JSON.
    pub async fn fetch(&self, id: &str) -> Result<Value> {
        let url = self.status_url(id)?;
        let connection = self.pool.acquire(&url)?;

        let connect_err = |source| Error::Connect {
            url: url.to_string(),
            source,
        };
        let response = connection
            .client()
            .get(url.clone())
            .send()
            .await
            .map_err(connect_err)?;
        let status = response.status();
        let body = response.bytes().await.map_err(connect_err)?;
        self.pool.release(connection);

        if status.as_u16() != 200 {
            tracing::warn!(id = %id, status = status.as_u16(), "status query returned non-200");
        }

        serde_json::from_slice(&body).map_err(|source| Error::Parse {
            url: url.to_string(),
            source,
        })
    }
}
