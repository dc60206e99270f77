//! In-memory reference implementation of `ViolationStore`.
//!
//! Deterministic and test-friendly; nothing survives the process.

use async_trait::async_trait;
use keen_types::ViolationRecord;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::traits::ViolationStore;
use crate::{StorageError, StorageResult};

#[derive(Default)]
pub struct InMemoryViolationStore {
    records: RwLock<Vec<ViolationRecord>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl InMemoryViolationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `records`.
    pub fn with_records(records: Vec<ViolationRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            ..Self::default()
        }
    }

    /// Number of successful `persist_violations` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make subsequent writes fail with a backend error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> Vec<ViolationRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl ViolationStore for InMemoryViolationStore {
    async fn load_violations(&self) -> StorageResult<Vec<ViolationRecord>> {
        Ok(self.records.read().await.clone())
    }

    async fn persist_violations(&self, records: &[ViolationRecord]) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("writes disabled".to_string()));
        }

        let mut guard = self.records.write().await;
        *guard = records.to_vec();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
