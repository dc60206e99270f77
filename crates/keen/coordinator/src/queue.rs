//! Participant queue.
//!
//! Ordered admission list with a fixed capacity, plus the interest set of
//! participants who want a ping once the queue is more than half full.
//! Pure state: callers pass `now` in and act on the returned outcomes.

use std::time::Duration;

use keen_types::{Participant, ParticipantId};
use tokio::time::Instant;

/// A participant's place in the queue.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub participant: Participant,
    pub joined_at: Instant,
}

/// Result of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Admitted at this 1-based position.
    Admitted { position: usize },
    AlreadyQueued,
    CapacityReached,
}

/// Result of a removal attempt.
#[derive(Debug, Clone)]
pub enum RemoveOutcome {
    /// Removed; `position` is the 1-based position the entry held.
    Removed { entry: QueueEntry, position: usize },
    NotQueued,
}

/// Result of toggling interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterestToggle {
    Added,
    Removed,
    /// Queued participants cannot register interest.
    AlreadyQueued,
}

/// What an admission obliges the caller to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// Nothing to do.
    Open,
    /// More than half full: ping the interest set.
    OverHalf,
    /// Full: start a ready check.
    Full,
}

#[derive(Debug, Clone)]
pub struct ParticipantQueue {
    capacity: usize,
    entries: Vec<QueueEntry>,
    interested: Vec<Participant>,
}

impl ParticipantQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
            interested: Vec::new(),
        }
    }

    /// Admit `participant` at the back of the queue.
    pub fn join(&mut self, participant: Participant, now: Instant) -> JoinOutcome {
        let back = self.entries.len();
        self.insert_at(participant, back, now)
    }

    /// Admit `participant` at 0-based `index`, clamped to the back.
    ///
    /// Used for re-admissions that should keep their earlier priority.
    pub fn insert_at(&mut self, participant: Participant, index: usize, now: Instant) -> JoinOutcome {
        if self.contains(&participant.id) {
            return JoinOutcome::AlreadyQueued;
        }
        if self.entries.len() >= self.capacity {
            return JoinOutcome::CapacityReached;
        }

        self.interested.retain(|p| p.id != participant.id);

        let index = index.min(self.entries.len());
        self.entries.insert(
            index,
            QueueEntry {
                participant,
                joined_at: now,
            },
        );

        JoinOutcome::Admitted {
            position: index + 1,
        }
    }

    pub fn leave(&mut self, id: &ParticipantId) -> RemoveOutcome {
        match self.entries.iter().position(|e| &e.participant.id == id) {
            Some(index) => RemoveOutcome::Removed {
                entry: self.entries.remove(index),
                position: index + 1,
            },
            None => RemoveOutcome::NotQueued,
        }
    }

    /// Remove every entry, returning them in queue order.
    pub fn clear(&mut self) -> Vec<QueueEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Remove the given participants, leaving everyone else in order.
    pub fn remove_all(&mut self, ids: &[ParticipantId]) -> Vec<QueueEntry> {
        let (removed, kept) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| ids.contains(&e.participant.id));
        self.entries = kept;
        removed
    }

    /// Toggle interest for a participant who is not queued.
    pub fn toggle_interest(&mut self, participant: Participant) -> InterestToggle {
        if self.contains(&participant.id) {
            return InterestToggle::AlreadyQueued;
        }

        if let Some(index) = self.interested.iter().position(|p| p == &participant) {
            self.interested.remove(index);
            InterestToggle::Removed
        } else {
            self.interested.push(participant);
            InterestToggle::Added
        }
    }

    pub fn interested(&self) -> &[Participant] {
        &self.interested
    }

    pub fn fill(&self) -> Fill {
        let size = self.entries.len();
        if size >= self.capacity {
            Fill::Full
        } else if size > self.capacity / 2 {
            Fill::OverHalf
        } else {
            Fill::Open
        }
    }

    /// Entries that have waited longer than `threshold`, with their
    /// 1-based positions.
    pub fn idle_since(&self, now: Instant, threshold: Duration) -> Vec<(Participant, usize)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| now.saturating_duration_since(e.joined_at) > threshold)
            .map(|(i, e)| (e.participant.clone(), i + 1))
            .collect()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.entries.iter().any(|e| &e.participant.id == id)
    }

    pub fn position(&self, id: &ParticipantId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| &e.participant.id == id)
            .map(|i| i + 1)
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    /// Participants with their 1-based positions, front first.
    pub fn snapshot(&self) -> Vec<(Participant, usize)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.participant.clone(), i + 1))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: u64) -> Participant {
        Participant::new(id, format!("<@{}>", id))
    }

    #[test]
    fn test_join_assigns_positions() {
        let now = Instant::now();
        let mut queue = ParticipantQueue::new(5);

        assert_eq!(queue.join(p(1), now), JoinOutcome::Admitted { position: 1 });
        assert_eq!(queue.join(p(2), now), JoinOutcome::Admitted { position: 2 });
        assert_eq!(queue.position(&ParticipantId::new(2)), Some(2));
    }

    #[test]
    fn test_duplicate_join_is_rejected_without_mutation() {
        let now = Instant::now();
        let mut queue = ParticipantQueue::new(5);
        queue.join(p(1), now);
        let before = queue.snapshot();

        assert_eq!(queue.join(Participant::new(1, "other handle"), now), JoinOutcome::AlreadyQueued);
        assert_eq!(queue.snapshot(), before);
        assert_eq!(queue.entries()[0].participant.handle, "<@1>");
    }

    #[test]
    fn test_capacity_reached() {
        let now = Instant::now();
        let mut queue = ParticipantQueue::new(2);
        queue.join(p(1), now);
        queue.join(p(2), now);

        assert_eq!(queue.join(p(3), now), JoinOutcome::CapacityReached);
        assert_eq!(queue.size(), 2);
    }

    #[test]
    fn test_fill_thresholds() {
        let now = Instant::now();
        let mut queue = ParticipantQueue::new(5);
        let mut fills = Vec::new();
        for id in 1..=5 {
            queue.join(p(id), now);
            fills.push(queue.fill());
        }

        assert_eq!(
            fills,
            vec![Fill::Open, Fill::Open, Fill::OverHalf, Fill::OverHalf, Fill::Full]
        );
    }

    #[test]
    fn test_join_clears_interest() {
        let now = Instant::now();
        let mut queue = ParticipantQueue::new(5);

        assert_eq!(queue.toggle_interest(p(1)), InterestToggle::Added);
        assert_eq!(queue.interested().len(), 1);

        queue.join(p(1), now);
        assert!(queue.interested().is_empty());
        assert_eq!(queue.toggle_interest(p(1)), InterestToggle::AlreadyQueued);
    }

    #[test]
    fn test_clear_returns_entries_in_order() {
        let now = Instant::now();
        let mut queue = ParticipantQueue::new(3);
        for id in 1..=3 {
            queue.join(p(id), now);
        }
        queue.toggle_interest(p(9));

        let removed: Vec<u64> = queue
            .clear()
            .into_iter()
            .map(|e| e.participant.id.as_u64())
            .collect();
        assert_eq!(removed, vec![1, 2, 3]);
        assert_eq!(queue.size(), 0);
        assert_eq!(queue.fill(), Fill::Open);
        assert_eq!(queue.interested().len(), 1);
        assert_eq!(queue.join(p(1), now), JoinOutcome::Admitted { position: 1 });
    }

    #[test]
    fn test_toggle_interest_twice_removes() {
        let mut queue = ParticipantQueue::new(5);
        queue.toggle_interest(p(4));
        assert_eq!(queue.toggle_interest(p(4)), InterestToggle::Removed);
        assert!(queue.interested().is_empty());
    }

    #[test]
    fn test_leave_reports_position() {
        let now = Instant::now();
        let mut queue = ParticipantQueue::new(5);
        queue.join(p(1), now);
        queue.join(p(2), now);

        match queue.leave(&ParticipantId::new(2)) {
            RemoveOutcome::Removed { entry, position } => {
                assert_eq!(entry.participant, p(2));
                assert_eq!(position, 2);
            }
            RemoveOutcome::NotQueued => panic!("expected removal"),
        }
        assert!(matches!(queue.leave(&ParticipantId::new(2)), RemoveOutcome::NotQueued));
    }

    #[test]
    fn test_insert_at_clamps_and_keeps_order() {
        let now = Instant::now();
        let mut queue = ParticipantQueue::new(5);
        queue.join(p(1), now);
        queue.join(p(2), now);

        assert_eq!(queue.insert_at(p(9), 0, now), JoinOutcome::Admitted { position: 1 });
        assert_eq!(queue.insert_at(p(8), 42, now), JoinOutcome::Admitted { position: 4 });

        let order: Vec<u64> = queue
            .snapshot()
            .iter()
            .map(|(p, _)| p.id.as_u64())
            .collect();
        assert_eq!(order, vec![9, 1, 2, 8]);
    }

    #[test]
    fn test_remove_all_keeps_others() {
        let now = Instant::now();
        let mut queue = ParticipantQueue::new(5);
        for id in 1..=4 {
            queue.join(p(id), now);
        }

        let removed = queue.remove_all(&[ParticipantId::new(1), ParticipantId::new(3)]);
        assert_eq!(removed.len(), 2);
        assert_eq!(queue.position(&ParticipantId::new(4)), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_since() {
        let mut queue = ParticipantQueue::new(5);
        queue.join(p(1), Instant::now());
        tokio::time::advance(Duration::from_secs(100)).await;
        queue.join(p(2), Instant::now());
        tokio::time::advance(Duration::from_secs(100)).await;

        let idle = queue.idle_since(Instant::now(), Duration::from_secs(150));
        assert_eq!(idle, vec![(p(1), 1)]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Join(u64),
            Leave(u64),
            Interest(u64),
        }

        fn op_strategy() -> impl Strategy<Value = Vec<Op>> {
            proptest::collection::vec(
                prop_oneof![
                    (0u64..8).prop_map(Op::Join),
                    (0u64..8).prop_map(Op::Leave),
                    (0u64..8).prop_map(Op::Interest),
                ],
                0..64,
            )
        }

        proptest! {
            #[test]
            fn property_queue_never_overflows_or_duplicates(
                capacity in 2usize..7,
                ops in op_strategy(),
            ) {
                let now = Instant::now();
                let mut queue = ParticipantQueue::new(capacity);

                for op in ops {
                    match op {
                        Op::Join(id) => { queue.join(p(id), now); }
                        Op::Leave(id) => { queue.leave(&ParticipantId::new(id)); }
                        Op::Interest(id) => { queue.toggle_interest(p(id)); }
                    }

                    prop_assert!(queue.size() <= capacity);

                    let mut ids: Vec<u64> = queue
                        .entries()
                        .iter()
                        .map(|e| e.participant.id.as_u64())
                        .collect();
                    ids.sort_unstable();
                    ids.dedup();
                    prop_assert_eq!(ids.len(), queue.size());

                    for interested in queue.interested() {
                        prop_assert!(!queue.contains(&interested.id));
                    }
                }
            }
        }
    }
}
