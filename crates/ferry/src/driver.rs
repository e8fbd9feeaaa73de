use anyhow::{Context, Result};
use chrono::Utc;
use ferry_source::ObjectSource;
use ferry_state::{ObjectRecord, Store};
use ferry_transfer::{ConnectionPool, upload};
use tokio::sync::Mutex;

/// Upload every source object that no record references yet, one at a
/// time, so each transfer's throughput is measured alone.
///
/// New records only mark the store dirty; the next reconciliation pass
/// writes them out. If an upload fails, records of the uploads before it
/// are committed before the error is returned. Returns how many objects
/// were uploaded.
pub async fn store_files<S: ObjectSource>(
    source: &S,
    pool: &ConnectionPool,
    endpoint_url: &str,
    store: &Mutex<Store>,
) -> Result<usize> {
    let err = match store_new_objects(source, pool, endpoint_url, store).await {
        Ok(stored) => return Ok(stored),
        Err(err) => err,
    };

    let mut store = store.lock().await;
    if store.is_dirty() {
        if let Err(commit) = store.commit().await {
            tracing::error!(error = %commit, "failed to write records of earlier uploads");
        }
    }
    Err(err)
}

async fn store_new_objects<S: ObjectSource>(
    source: &S,
    pool: &ConnectionPool,
    endpoint_url: &str,
    store: &Mutex<Store>,
) -> Result<usize> {
    let keys = source.list_objects().await.context("failed to list source objects")?;
    tracing::info!(objects = keys.len(), "listed source objects");

    let mut stored = 0;
    for key in keys {
        if store.lock().await.contains_source_key(&key) {
            tracing::debug!(key = %key, "already stored");
            continue;
        }

        tracing::info!(key = %key, "storing");
        let body = source
            .open_object(&key)
            .await
            .with_context(|| format!("failed to open {key}"))?;
        let uploaded = upload(pool, endpoint_url, body)
            .await
            .with_context(|| format!("failed to upload {key}"))?;
        let id = uploaded
            .id()
            .with_context(|| format!("failed to upload {key}"))?
            .to_string();

        tracing::info!(
            key = %key,
            id = %id,
            bytes = uploaded.bytes,
            bytes_per_second = uploaded.bytes_per_second,
            "stored"
        );

        let record = ObjectRecord::new(
            id,
            key.as_str(),
            uploaded.bytes,
            uploaded.digest,
            uploaded.bytes_per_second,
            Utc::now(),
        );
        store
            .lock()
            .await
            .insert(record)
            .with_context(|| format!("failed to record {key}"))?;
        stored += 1;
    }
    Ok(stored)
}
