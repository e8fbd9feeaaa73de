//! Periodic reconciliation of every known record.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use ferry_transfer::StatusFetcher;
use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::error::Result;
use crate::reconcile::reconcile;
use crate::store::Store;

/// Where status reports come from.
pub trait StatusSource: Send + Sync + 'static {
    fn fetch_status(&self, id: &str) -> impl Future<Output = ferry_transfer::Result<Value>> + Send;
}

impl StatusSource for StatusFetcher {
    fn fetch_status(&self, id: &str) -> impl Future<Output = ferry_transfer::Result<Value>> + Send {
        self.fetch(id)
    }
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub records:   usize,
    pub changed:   usize,
    /// Records skipped because their status could not be fetched or merged.
    pub failed:    usize,
    pub committed: bool,
}

/// Fetch status for every record concurrently, fold the reports in, and
/// commit once if anything changed or records were inserted since the last
/// commit.
///
/// A record whose fetch or merge fails is logged and left for the next
/// pass. An identity mismatch aborts the pass without committing.
pub async fn reconcile_pass<S: StatusSource>(store: &Mutex<Store>, source: &S) -> Result<PassSummary> {
    let ids = store.lock().await.ids();
    let reports = join_all(ids.iter().map(|id| source.fetch_status(id))).await;

    let mut store = store.lock().await;
    let mut summary = PassSummary {
        records: ids.len(),
        ..PassSummary::default()
    };

    for (id, report) in ids.iter().zip(reports) {
        let report = match report {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "status fetch failed");
                summary.failed += 1;
                continue;
            }
        };
        let Some(record) = store.get_mut(id) else {
            continue;
        };

        match reconcile(record, &report) {
            Ok(true) => summary.changed += 1,
            Ok(false) => {}
            Err(e) if e.is_fatal() => {
                tracing::error!(id = %id, error = %e, "status report does not belong to record");
                return Err(e.into());
            }
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "status report rejected");
                summary.failed += 1;
            }
        }
    }

    if summary.changed > 0 || store.is_dirty() {
        store.commit().await?;
        summary.committed = true;
    }
    Ok(summary)
}

enum LoopState {
    Idle,
    Reconciling(PassHandle),
}

/// A spawned pass that is cancelled when its handle goes away, so dropping
/// the polling loop never leaves a pass running behind it.
struct PassHandle(JoinHandle<Result<PassSummary>>);

impl Future for PassHandle {
    type Output = std::result::Result<Result<PassSummary>, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl Drop for PassHandle {
    fn drop(&mut self) { self.0.abort(); }
}

/// Runs [`reconcile_pass`] on a fixed tick, at most one pass at a time.
///
/// A tick that arrives while a pass is still running is dropped, and the
/// timer is re-armed from the moment a pass finishes.
pub struct Poller<S> {
    store:    Arc<Mutex<Store>>,
    source:   Arc<S>,
    interval: Duration,
}

impl<S: StatusSource> Poller<S> {
    pub fn new(store: Arc<Mutex<Store>>, source: Arc<S>, interval: Duration) -> Self {
        Self {
            store,
            source,
            interval,
        }
    }

    /// Poll until a pass fails fatally. Never returns `Ok`.
    ///
    /// Dropping the returned future also cancels a pass in flight.
    pub async fn run(self) -> Result<()> {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut state = LoopState::Idle;
        loop {
            state = match state {
                LoopState::Idle => {
                    ticker.tick().await;
                    LoopState::Reconciling(self.spawn_pass())
                }
                LoopState::Reconciling(mut pass) => {
                    tokio::select! {
                        joined = &mut pass => {
                            let summary = joined??;
                            tracing::info!(
                                records = summary.records,
                                changed = summary.changed,
                                failed = summary.failed,
                                committed = summary.committed,
                                "reconciliation pass done"
                            );
                            ticker.reset();
                            LoopState::Idle
                        }
                        _ = ticker.tick() => {
                            tracing::debug!("reconciliation still running, skipping tick");
                            LoopState::Reconciling(pass)
                        }
                    }
                }
            };
        }
    }

    fn spawn_pass(&self) -> PassHandle {
        let store = Arc::clone(&self.store);
        let source = Arc::clone(&self.source);
        PassHandle(tokio::spawn(async move {
            reconcile_pass(&store, source.as_ref()).await
        }))
    }
}
