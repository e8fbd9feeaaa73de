//! Folding replication status reports into object records.
//!
//! A status report is a point-in-time snapshot: pieces it mentions are
//! added or advanced, pieces it omits are left alone. Absence is never
//! taken as evidence of deletion.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::ReconcileError;
use crate::record::{ObjectRecord, PieceRecord};

/// One `(provider, piece, status)` triple taken from a status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceReport {
    pub provider_id: String,
    pub piece_id:    String,
    pub status:      String,
}

/// Fold `report` into `record`, stamping changes with the current time.
///
/// Returns whether `record` changed. On error `record` is left exactly as
/// it was.
pub fn reconcile(record: &mut ObjectRecord, report: &Value) -> Result<bool, ReconcileError> {
    reconcile_at(record, report, Utc::now())
}

pub fn reconcile_at(
    record: &mut ObjectRecord,
    report: &Value,
    now: DateTime<Utc>,
) -> Result<bool, ReconcileError> {
    let reported_id = report.get("id").and_then(Value::as_str);
    if reported_id != Some(record.id.as_str()) {
        return Err(ReconcileError::IdentityMismatch {
            expected: record.id.clone(),
            actual:   reported_id.map(str::to_string),
        });
    }

    // No replica list yet: the service has not started replicating.
    let Some(replicas) = report.get("replicas").and_then(Value::as_array) else {
        return Ok(false);
    };

    let pieces = replica_pieces(&record.id, replicas)?;
    Ok(merge(record, &pieces, now))
}

/// Flatten a report's replica list, validating its shape.
///
/// Accepts `providerId`/`pieceId` as well as the older `provider`/`pieceCid`
/// field names.
pub fn replica_pieces(id: &str, replicas: &[Value]) -> Result<Vec<PieceReport>, ReconcileError> {
    let malformed = |reason: String| ReconcileError::MalformedReplica {
        id: id.to_string(),
        reason,
    };

    let mut reports = Vec::new();
    for replica in replicas {
        let provider_id = string_field(replica, &["providerId", "provider"])
            .ok_or_else(|| malformed("replica has no providerId".to_string()))?;
        let pieces = replica
            .get("pieces")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed(format!("replica has no pieces on {provider_id}")))?;

        for piece in pieces {
            let piece_id = string_field(piece, &["pieceId", "pieceCid"])
                .ok_or_else(|| malformed(format!("piece has no pieceId on {provider_id}")))?;
            let status = string_field(piece, &["status"])
                .ok_or_else(|| malformed(format!("piece {piece_id} has no status on {provider_id}")))?;

            reports.push(PieceReport {
                provider_id: provider_id.to_string(),
                piece_id:    piece_id.to_string(),
                status:      status.to_string(),
            });
        }
    }
    Ok(reports)
}

/// Merge already-validated piece reports into `record`.
pub fn merge(record: &mut ObjectRecord, pieces: &[PieceReport], now: DateTime<Utc>) -> bool {
    let mut changed = false;

    if record.replicas_at.is_none() {
        record.replicas_at = Some(now);
        changed = true;
    }

    if record.pieces_missing {
        record.pieces_missing = false;
        changed = true;
    }

    for report in pieces {
        match record.piece_mut(&report.provider_id, &report.piece_id) {
            Some(piece) => {
                let previous = piece.status.clone();
                if piece.transition(&report.status, now) {
                    tracing::info!(
                        id = %record.id,
                        provider = %report.provider_id,
                        piece = %report.piece_id,
                        from = %previous,
                        to = %report.status,
                        "piece status changed"
                    );
                    changed = true;
                }
            }
            None => {
                record.pieces.push(PieceRecord::new(
                    &report.provider_id,
                    &report.piece_id,
                    &report.status,
                ));
                changed = true;
            }
        }
    }

    changed
}

fn string_field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| value.get(*name))
        .and_then(Value::as_str)
}
