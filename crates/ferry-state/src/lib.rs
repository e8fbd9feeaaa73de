//! Replication bookkeeping for uploaded objects.
//!
//! # Architecture
//!
//! - [`record`] - What is known about each object and its pieces
//! - [`mod@reconcile`] - Folding status reports into records
//! - [`store`] - The id-to-record map and its state file
//! - [`poll`] - The periodic reconciliation loop
//!
//! Records are only mutated by [`reconcile()`], under the store's lock, from
//! inside a reconciliation pass; the only other writer is
//! [`Store::insert`] for newly uploaded objects.

mod error;
pub mod poll;
pub mod reconcile;
pub mod record;
pub mod store;

pub use error::{Error, ReconcileError, Result};
pub use poll::{PassSummary, Poller, StatusSource, reconcile_pass};
pub use reconcile::{PieceReport, reconcile, reconcile_at};
pub use record::{ObjectRecord, PieceRecord, StatusUpdate};
pub use store::Store;
