//! Append-only violation ledger.
//!
//! In-memory side of the ledger. The coordinator mirrors it to a
//! `ViolationStore` after each mutation; a failed write never rolls an
//! append back.

use std::collections::HashMap;

use keen_types::{Participant, ParticipantId, ViolationRecord};

#[derive(Debug, Clone, Default)]
pub struct ViolationLedger {
    records: Vec<ViolationRecord>,
}

impl ViolationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<ViolationRecord>) -> Self {
        Self { records }
    }

    pub fn append(&mut self, record: ViolationRecord) {
        self.records.push(record);
    }

    /// All records in insertion order.
    pub fn all(&self) -> &[ViolationRecord] {
        &self.records
    }

    /// Wipe the ledger; returns how many records were dropped.
    ///
    /// Authorization is the caller's business.
    pub fn clear(&mut self) -> usize {
        let count = self.records.len();
        self.records.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count_for(&self, id: &ParticipantId) -> usize {
        self.records
            .iter()
            .filter(|r| &r.participant.id == id)
            .count()
    }

    /// Violation counts per participant, in order of first appearance.
    ///
    /// The handle reported is the most recently recorded one.
    pub fn aggregate_by_participant(&self) -> Vec<(Participant, usize)> {
        let mut index: HashMap<ParticipantId, usize> = HashMap::new();
        let mut counts: Vec<(Participant, usize)> = Vec::new();

        for record in &self.records {
            match index.get(&record.participant.id) {
                Some(&i) => {
                    counts[i].0 = record.participant.clone();
                    counts[i].1 += 1;
                }
                None => {
                    index.insert(record.participant.id, counts.len());
                    counts.push((record.participant.clone(), 1));
                }
            }
        }

        counts
    }
}
