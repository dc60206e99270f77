//! File-backed `ViolationStore`.
//!
//! The ledger is written as one JSON array. Each write goes to a sibling
//! `.tmp` file which is then renamed over the real one, so a crash mid-write
//! leaves the previous ledger intact.

use async_trait::async_trait;
use keen_types::ViolationRecord;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::traits::ViolationStore;
use crate::{StorageError, StorageResult};

pub struct JsonFileViolationStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileViolationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "violations".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ViolationStore for JsonFileViolationStore {
    async fn load_violations(&self) -> StorageResult<Vec<ViolationRecord>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No violation ledger on disk, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        let records: Vec<ViolationRecord> =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
                location: self.path.display().to_string(),
                reason: e.to_string(),
            })?;

        debug!(path = %self.path.display(), count = records.len(), "Loaded violation ledger");
        Ok(records)
    }

    async fn persist_violations(&self, records: &[ViolationRecord]) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;

        let payload = serde_json::to_vec_pretty(records)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &payload).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), count = records.len(), "Persisted violation ledger");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keen_types::{Participant, ViolationReason};

    fn record(id: u64, reason: ViolationReason) -> ViolationRecord {
        ViolationRecord::new(Participant::new(id, format!("<@{}>", id)), reason)
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileViolationStore::new(dir.path().join("violations.json"));

        assert!(store.load_violations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileViolationStore::new(dir.path().join("nested/violations.json"));
        let records = vec![
            record(3, ViolationReason::Left),
            record(1, ViolationReason::MissedReadyCheck),
            record(3, ViolationReason::DeferredExpired),
        ];

        store.persist_violations(&records).await.unwrap();
        assert_eq!(store.load_violations().await.unwrap(), records);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("violations.json");
        std::fs::write(&path, b"User ID,Mention\n1,<@1>\n").unwrap();

        let store = JsonFileViolationStore::new(&path);
        let err = store.load_violations().await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_rewrite_after_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("violations.json");

        let first = JsonFileViolationStore::new(&path);
        first
            .persist_violations(&[record(1, ViolationReason::Left)])
            .await
            .unwrap();

        let second = JsonFileViolationStore::new(&path);
        let mut loaded = second.load_violations().await.unwrap();
        loaded.push(record(2, ViolationReason::DeclinedDeferred));
        second.persist_violations(&loaded).await.unwrap();

        assert_eq!(first.load_violations().await.unwrap(), loaded);
    }

    mod properties {
        use super::*;
        use chrono::{TimeZone, Utc};
        use proptest::prelude::*;

        fn reason_strategy() -> impl Strategy<Value = ViolationReason> {
            prop_oneof![
                Just(ViolationReason::Left),
                Just(ViolationReason::MissedReadyCheck),
                Just(ViolationReason::DeclinedDeferred),
                Just(ViolationReason::DeferredExpired),
            ]
        }

        fn record_strategy() -> impl Strategy<Value = ViolationRecord> {
            (any::<u64>(), "[ -~]{0,24}", reason_strategy(), 0i64..4_000_000_000).prop_map(
                |(id, handle, reason, secs)| ViolationRecord {
                    participant: Participant::new(id, handle),
                    reason,
                    recorded_at: Utc.timestamp_opt(secs, 0).unwrap(),
                },
            )
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn property_persist_then_load_is_identity(
                records in proptest::collection::vec(record_strategy(), 0..16)
            ) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("runtime");

                rt.block_on(async move {
                    let dir = tempfile::tempdir().unwrap();
                    let store = JsonFileViolationStore::new(dir.path().join("v.json"));

                    store.persist_violations(&records).await.unwrap();
                    let loaded = store.load_violations().await.unwrap();
                    prop_assert_eq!(&loaded, &records);
                    prop_assert_eq!(
                        loaded.iter().map(|r| r.participant.handle.clone()).collect::<Vec<_>>(),
                        records.iter().map(|r| r.participant.handle.clone()).collect::<Vec<_>>()
                    );

                    store.persist_violations(&loaded).await.unwrap();
                    prop_assert_eq!(store.load_violations().await.unwrap(), records);
                    Ok(())
                })?;
            }
        }
    }
}
