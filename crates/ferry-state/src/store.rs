use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ferry_fs::{AtomicWriteOptions, atomic_write, read_if_exists};

use crate::error::{Error, Result};
use crate::record::ObjectRecord;

/// The id-to-record map, mirrored to one JSON file.
///
/// The whole map lives in memory; [`Store::commit`] rewrites the file by
/// staging a copy next to it and renaming it into place.
#[derive(Debug)]
pub struct Store {
    path:    PathBuf,
    records: BTreeMap<String, ObjectRecord>,
    dirty:   bool,
}

impl Store {
    /// Load `path`, starting empty if the file does not exist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match read_if_exists(&path)? {
            Some(content) => Self::parse(&path, &content)?,
            None => {
                tracing::info!(path = %path.display(), "no state file, starting empty");
                BTreeMap::new()
            }
        };

        Ok(Self {
            path,
            records,
            dirty: false,
        })
    }

    fn parse(path: &Path, content: &[u8]) -> Result<BTreeMap<String, ObjectRecord>> {
        let records: BTreeMap<String, ObjectRecord> =
            serde_json::from_slice(content).map_err(|source| Error::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some((key, record)) = records.iter().find(|(key, record)| **key != record.id) {
            return Err(Error::MisfiledRecord {
                key: key.clone(),
                id:  record.id.clone(),
            });
        }
        Ok(records)
    }

    /// Add a freshly uploaded object. Ids are assigned remotely, so a
    /// collision means the bookkeeping is broken.
    pub fn insert(&mut self, record: ObjectRecord) -> Result<()> {
        if self.records.contains_key(&record.id) {
            return Err(Error::DuplicateId(record.id));
        }
        self.records.insert(record.id.clone(), record);
        self.dirty = true;
        Ok(())
    }

    pub fn contains_source_key(&self, key: &str) -> bool {
        self.records.values().any(|r| r.source_key == key)
    }

    pub fn ids(&self) -> Vec<String> { self.records.keys().cloned().collect() }

    pub fn get(&self, id: &str) -> Option<&ObjectRecord> { self.records.get(id) }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut ObjectRecord> {
        self.records.get_mut(id)
    }

    pub fn len(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectRecord> { self.records.values() }

    /// Records were inserted since the last commit.
    pub fn is_dirty(&self) -> bool { self.dirty }

    pub fn path(&self) -> &Path { &self.path }

    /// Serialized file content: one `"id": {record}` entry per line, ids ascending.
    pub fn render(&self) -> Result<String> {
        let mut out = String::from("{\n");
        for (i, (id, record)) in self.records.iter().enumerate() {
            if i > 0 {
                out.push_str(",\n");
            }
            out.push_str(&serde_json::to_string(id).map_err(Error::Serialize)?);
            out.push_str(": ");
            out.push_str(&serde_json::to_string(record).map_err(Error::Serialize)?);
        }
        if !self.records.is_empty() {
            out.push('\n');
        }
        out.push_str("}\n");
        Ok(out)
    }

    /// Atomically replace the state file with the current map.
    pub async fn commit(&mut self) -> Result<()> {
        let content = self.render()?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            atomic_write(&path, content.as_bytes(), AtomicWriteOptions::new())
        })
        .await??;

        self.dirty = false;
        tracing::info!(path = %self.path.display(), records = self.records.len(), "state committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn record(id: &str, key: &str) -> ObjectRecord {
        ObjectRecord::new(id, key, 3, "abc", 7, Utc.timestamp_opt(0, 0).unwrap())
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = Store::load(dir.path().join("status.json")).unwrap();
        assert!(store.is_empty());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_insert_marks_dirty_and_rejects_duplicates() {
        let dir = TempDir::new().unwrap();
        let mut store = Store::load(dir.path().join("status.json")).unwrap();

        store.insert(record("a", "k1")).unwrap();
        assert!(store.is_dirty());
        assert!(store.contains_source_key("k1"));
        assert!(!store.contains_source_key("k2"));

        let err = store.insert(record("a", "k2")).unwrap_err();
        assert!(matches!(err, Error::DuplicateId(ref id) if id == "a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_render_one_record_per_line() {
        let dir = TempDir::new().unwrap();
        let mut store = Store::load(dir.path().join("status.json")).unwrap();
        assert_eq!(store.render().unwrap(), "{\n}\n");

        store.insert(record("b", "k2")).unwrap();
        store.insert(record("a", "k1")).unwrap();
        let rendered = store.render().unwrap();
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("\"a\": {\"id\":\"a\""));
        assert!(lines[1].ends_with("},"));
        assert!(lines[2].starts_with("\"b\": {\"id\":\"b\""));
        assert!(!lines[2].contains("replicasAt"));

        let parsed: BTreeMap<String, ObjectRecord> = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[tokio::test]
    async fn test_commit_then_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");
        let mut store = Store::load(&path).unwrap();
        store.insert(record("a", "k1")).unwrap();
        store.insert(record("b", "k2")).unwrap();

        store.commit().await.unwrap();
        assert!(!store.is_dirty());

        let reloaded = Store::load(&path).unwrap();
        assert_eq!(reloaded.ids(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(reloaded.get("a"), store.get("a"));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");
        std::fs::write(&path, "{ \"a\": ").unwrap();

        assert!(matches!(Store::load(&path), Err(Error::Corrupt { .. })));
    }

    #[test]
    fn test_misfiled_record_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");
        let content = format!("{{\"a\": {}}}", serde_json::to_string(&record("b", "k")).unwrap());
        std::fs::write(&path, content).unwrap();

        let err = Store::load(&path).unwrap_err();
        assert!(matches!(err, Error::MisfiledRecord { ref key, ref id } if key == "a" && id == "b"));
    }
}
