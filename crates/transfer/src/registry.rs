use std::collections::HashMap;

use crate::TransferError;
use crate::types::UploadRecord;

/// Table of tracked uploads keyed by upload id.
///
/// A passive store: it never changes record state itself. Iteration order
/// follows registration order so uploads are advanced in the order they
/// were started.
#[derive(Debug, Default)]
pub struct UploadRegistry {
    records: HashMap<String, UploadRecord>,
    order: Vec<String>,
}

impl UploadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new record and returns its id.
    pub fn register(&mut self, record: UploadRecord) -> Result<String, TransferError> {
        let id = record.upload_id.clone();
        if self.records.contains_key(&id) {
            return Err(TransferError::DuplicateId(id));
        }
        self.order.push(id.clone());
        self.records.insert(id.clone(), record);
        Ok(id)
    }

    pub fn get(&self, upload_id: &str) -> Result<&UploadRecord, TransferError> {
        self.records
            .get(upload_id)
            .ok_or_else(|| TransferError::UploadNotFound(upload_id.to_string()))
    }

    pub(crate) fn get_mut(&mut self, upload_id: &str) -> Option<&mut UploadRecord> {
        self.records.get_mut(upload_id)
    }

    /// Deletes a record. No-op if absent.
    pub fn remove(&mut self, upload_id: &str) -> Option<UploadRecord> {
        let removed = self.records.remove(upload_id);
        if removed.is_some() {
            self.order.retain(|id| id != upload_id);
        }
        removed
    }

    /// Ids of records not yet in a terminal state.
    pub fn list_active(&self) -> Vec<String> {
        self.ids_where(|r| !r.state.is_terminal())
    }

    /// Ids of records in a terminal state, awaiting delivery.
    pub fn list_terminal(&self) -> Vec<String> {
        self.ids_where(|r| r.state.is_terminal())
    }

    fn ids_where(&self, pred: impl Fn(&UploadRecord) -> bool) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| self.records.get(*id).is_some_and(&pred))
            .cloned()
            .collect()
    }

    pub fn contains(&self, upload_id: &str) -> bool {
        self.records.contains_key(upload_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{UploadRequest, UploadState};
    use std::path::PathBuf;
    use std::time::Instant;

    fn record(id: &str) -> UploadRecord {
        UploadRecord::new(
            id.into(),
            UploadRequest {
                local_path: PathBuf::from("/tmp/a.dat"),
                cloud_path: String::new(),
                cloud_filename: "a.dat".into(),
                shareable: false,
                overwrite: true,
            },
            100,
            Instant::now(),
        )
    }

    #[test]
    fn register_and_get() {
        let mut registry = UploadRegistry::new();
        let id = registry.register(record("u1")).unwrap();
        assert_eq!(id, "u1");
        assert!(registry.contains("u1"));
        assert_eq!(registry.get("u1").unwrap().total_bytes, 100);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut registry = UploadRegistry::new();
        registry.register(record("u1")).unwrap();
        let err = registry.register(record("u1")).unwrap_err();
        assert!(matches!(err, TransferError::DuplicateId(id) if id == "u1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_unknown_is_not_found() {
        let registry = UploadRegistry::new();
        assert!(matches!(
            registry.get("missing"),
            Err(TransferError::UploadNotFound(_))
        ));
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = UploadRegistry::new();
        registry.register(record("u1")).unwrap();
        assert!(registry.remove("u1").is_some());
        assert!(registry.remove("u1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn active_and_terminal_partition_in_order() {
        let mut registry = UploadRegistry::new();
        for id in ["u1", "u2", "u3"] {
            registry.register(record(id)).unwrap();
        }
        registry.get_mut("u2").unwrap().state = UploadState::Failed;

        assert_eq!(registry.list_active(), vec!["u1", "u3"]);
        assert_eq!(registry.list_terminal(), vec!["u2"]);

        registry.remove("u1");
        assert_eq!(registry.list_active(), vec!["u3"]);
    }
}
