//! Idle eviction and grace-window re-admission.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use keen_coordinator::{GraceLapse, IdleExpiryMonitor, KeenConfig, KeenEvent, LeaveOutcome};
use keen_types::{Notice, ParticipantId};

const HOUR: Duration = Duration::from_secs(3600);

#[tokio::test(start_paused = true)]
async fn idle_participant_is_evicted_then_readmitted_in_place() {
    let h = harness().await;
    h.coordinator.join(participant(1)).await.unwrap();
    tokio::time::sleep(HOUR / 2).await;
    fill(&h.coordinator, 2..=3).await;
    tokio::time::sleep(HOUR / 2 + Duration::from_secs(1)).await;

    let evicted = h.coordinator.sweep_idle().await;
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].id.as_u64(), 1);
    assert_eq!(slot_ids(&h.coordinator.snapshot().await), vec![2, 3]);
    assert!(matches!(
        h.notifier.notices().await.last(),
        Some(Notice::Evicted { grace, .. }) if *grace == Duration::from_secs(600)
    ));

    // Nobody else is past the threshold yet.
    assert!(h.coordinator.sweep_idle().await.is_empty());

    tokio::time::sleep(Duration::from_secs(601)).await;

    assert_eq!(slot_ids(&h.coordinator.snapshot().await), vec![1, 2, 3]);
    assert!(matches!(
        h.notifier.notices().await.last(),
        Some(Notice::GraceRejoined { position: 1, .. })
    ));
    assert!(h.coordinator.violations().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn evictees_from_one_sweep_keep_their_order() {
    let h = harness().await;
    fill(&h.coordinator, 1..=2).await;
    tokio::time::sleep(HOUR / 2).await;
    h.coordinator.join(participant(3)).await.unwrap();
    tokio::time::sleep(HOUR / 2 + Duration::from_secs(1)).await;

    let evicted: Vec<u64> = h
        .coordinator
        .sweep_idle()
        .await
        .iter()
        .map(|p| p.id.as_u64())
        .collect();
    assert_eq!(evicted, vec![1, 2]);
    assert_eq!(slot_ids(&h.coordinator.snapshot().await), vec![3]);

    tokio::time::sleep(Duration::from_secs(601)).await;
    assert_eq!(slot_ids(&h.coordinator.snapshot().await), vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn cancelled_evictee_does_not_disturb_the_rest_of_its_cohort() {
    let h = harness().await;
    fill(&h.coordinator, 1..=3).await;
    tokio::time::sleep(HOUR / 2).await;
    h.coordinator.join(participant(4)).await.unwrap();
    tokio::time::sleep(HOUR / 2 + Duration::from_secs(1)).await;

    assert_eq!(h.coordinator.sweep_idle().await.len(), 3);
    assert_eq!(
        h.coordinator.leave(ParticipantId::new(2)).await.unwrap(),
        LeaveOutcome::GraceCancelled
    );

    tokio::time::sleep(Duration::from_secs(601)).await;
    assert_eq!(slot_ids(&h.coordinator.snapshot().await), vec![1, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn rejoining_during_grace_cancels_readmission() {
    let h = harness().await;
    let mut events = h.coordinator.subscribe();
    h.coordinator.join(participant(1)).await.unwrap();
    tokio::time::sleep(HOUR + Duration::from_secs(1)).await;
    h.coordinator.sweep_idle().await;

    h.coordinator.join(participant(2)).await.unwrap();
    h.coordinator.join(participant(1)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(601)).await;

    assert_eq!(slot_ids(&h.coordinator.snapshot().await), vec![2, 1]);
    let events = drain(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e, KeenEvent::GraceCancelled { participant } if participant.id.as_u64() == 1)));
    assert!(!events
        .iter()
        .any(|e| matches!(e, KeenEvent::GraceRejoined { .. })));
}

#[tokio::test(start_paused = true)]
async fn leaving_during_grace_cancels_without_penalty() {
    let h = harness().await;
    h.coordinator.join(participant(1)).await.unwrap();
    tokio::time::sleep(HOUR + Duration::from_secs(1)).await;
    h.coordinator.sweep_idle().await;

    let outcome = h.coordinator.leave(ParticipantId::new(1)).await.unwrap();
    assert_eq!(outcome, LeaveOutcome::GraceCancelled);

    tokio::time::sleep(Duration::from_secs(601)).await;
    assert!(h.coordinator.snapshot().await.is_empty());
    assert!(h.coordinator.violations().await.is_empty());
    assert_eq!(h.coordinator.cooldown_entries().await, 0);
}

#[tokio::test(start_paused = true)]
async fn grace_lapses_when_the_queue_is_full() {
    let h = harness().await;
    let mut events = h.coordinator.subscribe();
    h.coordinator.join(participant(1)).await.unwrap();
    tokio::time::sleep(HOUR / 2).await;
    fill(&h.coordinator, 2..=4).await;
    tokio::time::sleep(HOUR / 2 + Duration::from_secs(1)).await;
    h.coordinator.sweep_idle().await;

    tokio::time::sleep(Duration::from_secs(300)).await;
    fill(&h.coordinator, 5..=6).await;
    assert!(h.coordinator.round_active().await);

    tokio::time::sleep(Duration::from_secs(301)).await;

    assert!(!h.coordinator.snapshot().await.contains(&ParticipantId::new(1)));
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        KeenEvent::GraceLapsed { participant, reason: GraceLapse::QueueFull }
            if participant.id.as_u64() == 1
    )));
}

#[tokio::test(start_paused = true)]
async fn sweep_skips_the_active_round() {
    let mut config = KeenConfig::default();
    config.idle.idle_threshold_secs = 100;
    let h = harness_with(config).await;
    fill(&h.coordinator, 1..=5).await;
    settle().await;

    tokio::time::sleep(Duration::from_secs(500)).await;
    assert!(h.coordinator.round_active().await);
    assert!(h.coordinator.sweep_idle().await.is_empty());
    assert_eq!(h.coordinator.snapshot().await.slots.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn monitor_sweeps_on_its_interval() {
    let h = harness().await;
    let mut monitor = IdleExpiryMonitor::start(Arc::clone(&h.coordinator));
    assert!(monitor.is_running());

    h.coordinator.join(participant(1)).await.unwrap();
    tokio::time::sleep(HOUR + Duration::from_secs(61)).await;

    assert!(!h.coordinator.snapshot().await.contains(&ParticipantId::new(1)));
    assert!(h
        .notifier
        .notices()
        .await
        .iter()
        .any(|n| matches!(n, Notice::Evicted { .. })));

    monitor.stop();
    assert!(!monitor.is_running());
}
