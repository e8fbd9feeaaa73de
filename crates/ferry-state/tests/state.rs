//! Reconciliation passes, the polling loop and state file durability.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use ferry_fs::{AtomicWriteOptions, staging_path};
use ferry_state::{
    Error, ObjectRecord, PassSummary, Poller, ReconcileError, StatusSource, Store, reconcile_pass,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::Mutex;

/// Status source answering from a fixed table; unknown ids fail.
#[derive(Default)]
struct Scripted {
    reports:       HashMap<String, Value>,
    delay:         Duration,
    calls:         AtomicUsize,
    in_flight:     AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Scripted {
    fn with(reports: impl IntoIterator<Item = (&'static str, Value)>) -> Self {
        Self {
            reports: reports
                .into_iter()
                .map(|(id, report)| (id.to_string(), report))
                .collect(),
            ..Self::default()
        }
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl StatusSource for Scripted {
    async fn fetch_status(&self, id: &str) -> ferry_transfer::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.reports
            .get(id)
            .cloned()
            .ok_or_else(|| ferry_transfer::Error::Protocol {
                url:    format!("scripted://{id}"),
                reason: "no scripted report".to_string(),
            })
    }
}

fn record(id: &str) -> ObjectRecord {
    ObjectRecord::new(
        id,
        format!("src/{id}"),
        1024,
        "ab".repeat(32),
        512,
        Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    )
}

fn ready(id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "replicas": [{ "providerId": "p1", "pieces": [{ "pieceId": "c1", "status": status }] }]
    })
}

/// Write a state file directly, so the loaded store starts clean.
fn seed(path: &Path, records: &[ObjectRecord]) {
    let map: BTreeMap<&str, &ObjectRecord> = records.iter().map(|r| (r.id.as_str(), r)).collect();
    std::fs::write(path, serde_json::to_vec(&map).unwrap()).unwrap();
}

fn snapshot(store: &Store) -> Vec<ObjectRecord> { store.iter().cloned().collect() }

#[tokio::test]
async fn test_pass_merges_reports_and_isolates_failures() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status.json");
    seed(&path, &[record("a"), record("b"), record("c")]);
    let store = Mutex::new(Store::load(&path).unwrap());

    let source = Scripted::with([
        ("a", ready("a", "queued")),
        ("c", json!({ "id": "c", "replicas": [{ "providerId": "p1" }] })),
    ]);

    let summary = reconcile_pass(&store, &source).await.unwrap();
    assert_eq!(
        summary,
        PassSummary {
            records:   3,
            changed:   1,
            failed:    2,
            committed: true,
        }
    );

    let reloaded = Store::load(&path).unwrap();
    assert_eq!(reloaded.get("a").unwrap().piece("p1", "c1").unwrap().status, "queued");
    assert!(reloaded.get("b").unwrap().pieces.is_empty());
    assert!(reloaded.get("c").unwrap().replicas_at.is_none());

    let again = reconcile_pass(&store, &source).await.unwrap();
    assert_eq!(again.changed, 0);
    assert!(!again.committed);
}

#[tokio::test]
async fn test_pass_commits_new_records_even_without_changes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status.json");
    let mut store = Store::load(&path).unwrap();
    store.insert(record("fresh")).unwrap();
    let store = Mutex::new(store);

    let source = Scripted::with([("fresh", json!({ "id": "fresh" }))]);
    let summary = reconcile_pass(&store, &source).await.unwrap();

    assert_eq!(summary.changed, 0);
    assert!(summary.committed);
    assert!(!store.lock().await.is_dirty());
    assert_eq!(Store::load(&path).unwrap().len(), 1);
}

#[tokio::test]
async fn test_identity_mismatch_aborts_the_pass_without_committing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status.json");
    seed(&path, &[record("a"), record("b")]);
    let before = std::fs::read(&path).unwrap();
    let store = Mutex::new(Store::load(&path).unwrap());

    let source = Scripted::with([("a", ready("a", "active")), ("b", ready("z", "active"))]);
    let err = reconcile_pass(&store, &source).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Reconcile(ReconcileError::IdentityMismatch { ref expected, .. }) if expected == "b"
    ));
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[tokio::test]
async fn test_committed_state_survives_a_torn_staging_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status.json");
    let mut store = Store::load(&path).unwrap();
    store.insert(record("a")).unwrap();
    store.insert(record("b")).unwrap();
    store.commit().await.unwrap();
    let committed = snapshot(&store);

    // A crash halfway through the next commit leaves a partial staging file.
    let staging = staging_path(&path, &AtomicWriteOptions::new()).unwrap();
    let rendered = store.render().unwrap();
    std::fs::write(&staging, &rendered.as_bytes()[..rendered.len() / 2]).unwrap();

    assert_eq!(snapshot(&Store::load(&path).unwrap()), committed);

    store.insert(record("c")).unwrap();
    store.commit().await.unwrap();
    assert!(!staging.exists());
    assert_eq!(snapshot(&Store::load(&path).unwrap()), snapshot(&store));
}

#[tokio::test(start_paused = true)]
async fn test_poller_never_overlaps_passes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status.json");
    seed(&path, &[record("a")]);
    let store = Arc::new(Mutex::new(Store::load(&path).unwrap()));

    // Each pass outlives two ticks.
    let source = Arc::new(
        Scripted::with([("a", json!({ "id": "a" }))]).delayed(Duration::from_secs(25)),
    );
    let poller = Poller::new(store, Arc::clone(&source), Duration::from_secs(10));

    // Passes start at 10s, 45s and 80s; the ticks in between are dropped.
    let outcome = tokio::time::timeout(Duration::from_secs(90), poller.run()).await;
    assert!(outcome.is_err(), "poller stopped early: {outcome:?}");

    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_poller_stops_on_identity_mismatch() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status.json");
    seed(&path, &[record("a")]);
    let store = Arc::new(Mutex::new(Store::load(&path).unwrap()));

    let source = Arc::new(Scripted::with([("a", ready("someone-else", "active"))]));
    let poller = Poller::new(store, Arc::clone(&source), Duration::from_secs(10));

    let err = tokio::time::timeout(Duration::from_secs(60), poller.run())
        .await
        .expect("poller should stop on its own")
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Reconcile(ReconcileError::IdentityMismatch { .. })
    ));
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stopping_the_poller_cancels_the_pass_in_flight() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status.json");
    seed(&path, &[record("a")]);
    let on_disk = std::fs::read(&path).unwrap();
    let store = Arc::new(Mutex::new(Store::load(&path).unwrap()));

    let source = Arc::new(
        Scripted::with([("a", ready("a", "active"))]).delayed(Duration::from_secs(25)),
    );
    let poller = Poller::new(Arc::clone(&store), Arc::clone(&source), Duration::from_secs(10));
    let polling = tokio::spawn(poller.run());

    // The first pass starts at 10s and is still fetching at 15s.
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(source.in_flight.load(Ordering::SeqCst), 1);

    polling.abort();
    assert!(polling.await.unwrap_err().is_cancelled());
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    let store = store.lock().await;
    assert!(store.get("a").unwrap().pieces.is_empty());
    assert!(!store.is_dirty());
    assert_eq!(std::fs::read(&path).unwrap(), on_disk);
}
