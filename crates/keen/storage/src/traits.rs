use async_trait::async_trait;
use keen_types::ViolationRecord;

use crate::StorageResult;

/// Durable home of the violation ledger.
///
/// The ledger is small and rewritten whole: `persist_violations` replaces
/// whatever was stored with exactly the given sequence, and
/// `load_violations` returns it in the same order.
#[async_trait]
pub trait ViolationStore: Send + Sync {
    /// Load the stored ledger. A store that was never written loads empty.
    async fn load_violations(&self) -> StorageResult<Vec<ViolationRecord>>;

    /// Replace the stored ledger with `records`.
    async fn persist_violations(&self, records: &[ViolationRecord]) -> StorageResult<()>;
}
