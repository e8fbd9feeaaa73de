use std::io;
use std::time::Instant;

use ferry_verify::{DigestTap, Sha256Hasher};
use futures_util::{StreamExt, TryStreamExt};

use crate::core::Throughput;
use crate::data::Retrieval;
use crate::effects::pool::{Connection, parse_url};
use crate::error::{Error, Result, Stage};

/// Read `{base_url}/{id}` back over a fresh, unpooled connection and check
/// its digest against `expected_digest` (hex).
pub async fn retrieve(base_url: &str, id: &str, expected_digest: &str) -> Result<Retrieval> {
    let url = parse_url(&format!("{}/{}", base_url.trim_end_matches('/'), id))?;
    let connection = Connection::open(&url)?;
    let connect_err = |source| Error::Connect {
        url: url.to_string(),
        source,
    };

    let started = Instant::now();
    let response = connection
        .client()
        .get(url.clone())
        .send()
        .await
        .map_err(connect_err)?;
    if response.status().as_u16() != 200 {
        return Err(Error::UnexpectedStatus {
            url:    url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let body = Box::pin(response.bytes_stream().map_err(io::Error::other));
    let mut tap = DigestTap::new(body, Sha256Hasher::new());
    let mut ttfb = None;
    while let Some(chunk) = tap.next().await {
        chunk.map_err(|source| Error::Transfer {
            url: url.to_string(),
            stage: Stage::Response,
            source,
        })?;
        ttfb.get_or_insert_with(|| started.elapsed());
    }
    let ttlb = started.elapsed();

    tap.verify(expected_digest)?;

    let throughput = Throughput::measure(tap.bytes(), ttlb);
    Ok(Retrieval {
        bytes: throughput.bytes,
        ttfb: ttfb.unwrap_or(ttlb),
        ttlb,
        bytes_per_second: throughput.bytes_per_second,
    })
}
