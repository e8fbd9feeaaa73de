use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything known about one uploaded object.
///
/// `id` is assigned by the storage service at upload time and is the
/// primary key of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredRecord")]
pub struct ObjectRecord {
    pub id:                String,
    pub source_key:        String,
    pub byte_count:        u64,
    /// Lowercase hex SHA-256 of the uploaded content.
    pub digest:            String,
    /// Upload speed in bytes per second.
    pub upload_throughput: u64,
    pub uploaded_at:       DateTime<Utc>,
    /// First time the service reported replicas for this object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas_at:       Option<DateTime<Utc>>,
    pub pieces:            Vec<PieceRecord>,
    /// Loaded from a file that had no `pieces` list.
    #[serde(skip)]
    pub(crate) pieces_missing: bool,
}

/// On-disk shape of [`ObjectRecord`], which may predate the `pieces` list.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    id:                String,
    source_key:        String,
    byte_count:        u64,
    digest:            String,
    upload_throughput: u64,
    uploaded_at:       DateTime<Utc>,
    #[serde(default)]
    replicas_at:       Option<DateTime<Utc>>,
    pieces:            Option<Vec<PieceRecord>>,
}

impl From<StoredRecord> for ObjectRecord {
    fn from(stored: StoredRecord) -> Self {
        Self {
            id:                stored.id,
            source_key:        stored.source_key,
            byte_count:        stored.byte_count,
            digest:            stored.digest,
            upload_throughput: stored.upload_throughput,
            uploaded_at:       stored.uploaded_at,
            replicas_at:       stored.replicas_at,
            pieces_missing:    stored.pieces.is_none(),
            pieces:            stored.pieces.unwrap_or_default(),
        }
    }
}

impl ObjectRecord {
    pub fn new(
        id: impl Into<String>,
        source_key: impl Into<String>,
        byte_count: u64,
        digest: impl Into<String>,
        upload_throughput: u64,
        uploaded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            source_key: source_key.into(),
            byte_count,
            digest: digest.into(),
            upload_throughput,
            uploaded_at,
            replicas_at: None,
            pieces: Vec::new(),
            pieces_missing: false,
        }
    }

    pub fn piece(&self, provider_id: &str, piece_id: &str) -> Option<&PieceRecord> {
        self.pieces
            .iter()
            .find(|p| p.provider_id == provider_id && p.piece_id == piece_id)
    }

    pub(crate) fn piece_mut(&mut self, provider_id: &str, piece_id: &str) -> Option<&mut PieceRecord> {
        self.pieces
            .iter_mut()
            .find(|p| p.provider_id == provider_id && p.piece_id == piece_id)
    }
}

/// One provider's piece of an object, with its status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceRecord {
    pub provider_id: String,
    pub piece_id:    String,
    pub status:      String,
    /// Append-only; `status` equals the last entry's new status.
    #[serde(default)]
    pub updates:     Vec<StatusUpdate>,
}

impl PieceRecord {
    pub fn new(
        provider_id: impl Into<String>,
        piece_id: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            piece_id:    piece_id.into(),
            status:      status.into(),
            updates:     Vec::new(),
        }
    }

    /// Move to `status`, recording the transition. Returns whether anything changed.
    pub(crate) fn transition(&mut self, status: &str, at: DateTime<Utc>) -> bool {
        if self.status == status {
            return false;
        }
        let previous = std::mem::replace(&mut self.status, status.to_string());
        self.updates
            .push(StatusUpdate(previous, status.to_string(), at));
        true
    }
}

/// `[previous, new, timestamp]` entry of a piece's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate(String, String, DateTime<Utc>);

impl StatusUpdate {
    pub fn new(previous: impl Into<String>, current: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self(previous.into(), current.into(), at)
    }

    pub fn previous(&self) -> &str { &self.0 }

    pub fn current(&self) -> &str { &self.1 }

    pub fn at(&self) -> DateTime<Utc> { self.2 }
}
