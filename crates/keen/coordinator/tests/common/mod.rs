#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use keen_coordinator::{Coordinator, KeenConfig, KeenEvent, RecordingNotifier};
use keen_storage::InMemoryViolationStore;
use keen_types::{BroadcastHandle, Notice, Participant};
use tokio::sync::broadcast;

pub struct Harness {
    pub coordinator: Arc<Coordinator>,
    pub notifier: Arc<RecordingNotifier>,
    pub store: Arc<InMemoryViolationStore>,
}

pub async fn harness() -> Harness {
    harness_with(KeenConfig::default()).await
}

pub async fn harness_with(config: KeenConfig) -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let notifier = Arc::new(RecordingNotifier::new());
    let store = Arc::new(InMemoryViolationStore::new());
    let coordinator = Coordinator::new(config, notifier.clone(), store.clone())
        .await
        .unwrap();
    Harness {
        coordinator,
        notifier,
        store,
    }
}

pub fn participant(id: u64) -> Participant {
    Participant::new(id, format!("user{id}"))
}

/// Let spawned tasks run without moving the clock meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub async fn fill(coordinator: &Arc<Coordinator>, ids: impl IntoIterator<Item = u64>) {
    for id in ids {
        coordinator.join(participant(id)).await.unwrap();
    }
}

/// Handle of the active round's confirmation request.
pub async fn round_handle(coordinator: &Arc<Coordinator>) -> BroadcastHandle {
    settle().await;
    coordinator
        .active_round()
        .await
        .expect("a round should be active")
        .handle
        .expect("round request should be posted")
}

/// Handle of the most recent notice matching `pred`.
pub async fn handle_of(
    notifier: &RecordingNotifier,
    pred: impl Fn(&Notice) -> bool,
) -> BroadcastHandle {
    notifier
        .sent()
        .await
        .into_iter()
        .rev()
        .find(|(_, notice)| pred(notice))
        .map(|(handle, _)| handle)
        .expect("matching notice")
}

pub fn drain(rx: &mut broadcast::Receiver<KeenEvent>) -> Vec<KeenEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn slot_ids(snapshot: &keen_coordinator::QueueSnapshot) -> Vec<u64> {
    snapshot
        .slots
        .iter()
        .map(|s| s.participant.id.as_u64())
        .collect()
}
