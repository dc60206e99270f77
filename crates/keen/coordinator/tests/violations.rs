//! Ledger loading, aggregation and clearing.

mod common;

use std::sync::Arc;

use common::*;
use keen_coordinator::{Authority, Coordinator, KeenConfig, KeenError, RecordingNotifier};
use keen_storage::InMemoryViolationStore;
use keen_types::{ParticipantId, ViolationReason, ViolationRecord};

#[tokio::test(start_paused = true)]
async fn ledger_is_loaded_on_startup() {
    let store = Arc::new(InMemoryViolationStore::with_records(vec![
        ViolationRecord::new(participant(1), ViolationReason::Left),
        ViolationRecord::new(participant(2), ViolationReason::MissedReadyCheck),
        ViolationRecord::new(participant(1), ViolationReason::DeferredExpired),
    ]));
    let coordinator = Coordinator::new(
        KeenConfig::default(),
        Arc::new(RecordingNotifier::new()),
        store.clone(),
    )
    .await
    .unwrap();

    assert_eq!(coordinator.violations().await.len(), 3);
    let counts: Vec<(u64, usize)> = coordinator
        .violation_counts()
        .await
        .into_iter()
        .map(|(p, n)| (p.id.as_u64(), n))
        .collect();
    assert_eq!(counts, vec![(1, 2), (2, 1)]);
}

#[tokio::test(start_paused = true)]
async fn new_violations_append_to_loaded_ones() {
    let store = Arc::new(InMemoryViolationStore::with_records(vec![ViolationRecord::new(
        participant(7),
        ViolationReason::Left,
    )]));
    let coordinator = Coordinator::new(
        KeenConfig::default(),
        Arc::new(RecordingNotifier::new()),
        store.clone(),
    )
    .await
    .unwrap();

    coordinator.join(participant(1)).await.unwrap();
    coordinator.leave(ParticipantId::new(1)).await.unwrap();

    let stored: Vec<u64> = store
        .snapshot()
        .await
        .iter()
        .map(|r| r.participant.id.as_u64())
        .collect();
    assert_eq!(stored, vec![7, 1]);
}

#[tokio::test(start_paused = true)]
async fn clearing_requires_privilege() {
    let h = harness().await;
    fill(&h.coordinator, 1..=2).await;
    h.coordinator.leave(ParticipantId::new(1)).await.unwrap();
    h.coordinator.leave(ParticipantId::new(2)).await.unwrap();

    assert!(matches!(
        h.coordinator.clear_violations(Authority::Member).await,
        Err(KeenError::Unauthorized)
    ));
    assert_eq!(h.coordinator.violations().await.len(), 2);

    assert_eq!(
        h.coordinator.clear_violations(Authority::Privileged).await.unwrap(),
        2
    );
    assert!(h.coordinator.violations().await.is_empty());
    assert!(h.store.snapshot().await.is_empty());

    // Clearing the ledger leaves cooldowns alone.
    assert_eq!(h.coordinator.cooldown_entries().await, 2);
}
