//! The coordinator.
//!
//! One `Coordinator` owns the queue, cooldowns, violation ledger, the active
//! ready check, and every pending deferred admission and grace window. All
//! of it sits behind a single mutex, so admissions, confirmations, timers
//! and sweeps never interleave partial updates.
//!
//! Mutations collect their side effects (notices, events, a ledger write, a
//! round to launch) while the lock is held and carry them out after it is
//! released; no notifier or store call ever runs under the state lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use keen_storage::ViolationStore;
use keen_types::{
    BroadcastHandle, Notice, Participant, ParticipantId, RoundId, ViolationReason,
    ViolationRecord,
};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::KeenConfig;
use crate::cooldown::CooldownRegistry;
use crate::deferred::DeferredEntry;
use crate::error::{KeenError, KeenResult};
use crate::events::KeenEvent;
use crate::ledger::ViolationLedger;
use crate::monitor::GraceEntry;
use crate::notifier::Notifier;
use crate::queue::{Fill, JoinOutcome, ParticipantQueue, RemoveOutcome};
use crate::ready_check::{ConfirmStep, ReadyCheck, RoundLaunch};

/// Who is asking, for the one privileged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    Member,
    Privileged,
}

/// Successful result of [`Coordinator::leave`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Left the queue; a violation was recorded and a cooldown started.
    Removed {
        position: usize,
        cooldown_until: Instant,
    },
    /// Not queued, but a pending grace re-admission was cancelled.
    GraceCancelled,
    /// Not queued, but a pending deferred admission was cancelled.
    DeferredCancelled,
}

/// Result of a confirmation or decline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Counted; `remaining` participants still have to confirm.
    Accepted { remaining: usize },
    /// Already counted earlier.
    Duplicate,
    /// Dropped without effect.
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The handle matches no open round or deferred request.
    UnknownHandle,
    /// The responder is not one of the participants being asked.
    NotParticipant,
    /// Ready checks only take confirmations.
    DeclineNotSupported,
}

/// One occupied queue slot.
#[derive(Debug, Clone)]
pub struct QueueSlot {
    pub participant: Participant,
    pub position: usize,
    pub joined_at: Instant,
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub capacity: usize,
    pub slots: Vec<QueueSlot>,
    pub interested: Vec<Participant>,
    pub round_active: bool,
}

impl QueueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.slots.iter().any(|s| &s.participant.id == id)
    }
}

/// View of the active ready check.
#[derive(Debug, Clone)]
pub struct RoundView {
    pub id: RoundId,
    pub handle: Option<BroadcastHandle>,
    pub participants: Vec<Participant>,
    pub confirmed: Vec<Participant>,
    pub deadline: Instant,
}

pub(crate) struct CoordinatorState {
    pub(crate) queue: ParticipantQueue,
    pub(crate) cooldowns: CooldownRegistry,
    pub(crate) ledger: ViolationLedger,
    pub(crate) round: Option<ReadyCheck>,
    pub(crate) deferred: HashMap<ParticipantId, DeferredEntry>,
    pub(crate) grace: HashMap<ParticipantId, GraceEntry>,
    /// One re-admission task per eviction cohort.
    pub(crate) grace_tasks: HashMap<Uuid, JoinHandle<()>>,
}

impl CoordinatorState {
    /// Record a violation; the caller marks the ledger dirty.
    pub(crate) fn record_violation(&mut self, participant: &Participant, reason: ViolationReason) {
        self.ledger
            .append(ViolationRecord::new(participant.clone(), reason));
        info!(
            participant = %participant.id,
            reason = %reason,
            total = self.ledger.count_for(&participant.id),
            "Violation recorded"
        );
    }
}

/// Side effects gathered under the state lock.
#[derive(Default)]
pub(crate) struct Effects {
    pub(crate) notices: Vec<Notice>,
    pub(crate) events: Vec<KeenEvent>,
    pub(crate) ledger_dirty: bool,
    pub(crate) launch: Option<RoundLaunch>,
}

impl Effects {
    pub(crate) fn notice(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    pub(crate) fn event(&mut self, event: KeenEvent) {
        self.events.push(event);
    }
}

pub struct Coordinator {
    pub(crate) config: KeenConfig,
    pub(crate) state: Mutex<CoordinatorState>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn ViolationStore>,
    persist_lock: Mutex<()>,
    pub(crate) event_tx: broadcast::Sender<KeenEvent>,
}

impl Coordinator {
    /// Build a coordinator and load the violation ledger from `store`.
    ///
    /// An unreadable store is logged and treated as empty.
    pub async fn new(
        config: KeenConfig,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn ViolationStore>,
    ) -> KeenResult<Arc<Self>> {
        config.validate()?;

        let records = match store.load_violations().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Could not load violation ledger, starting empty");
                Vec::new()
            }
        };
        info!(
            violations = records.len(),
            capacity = config.queue.capacity,
            "Coordinator ready"
        );

        let (event_tx, _) = broadcast::channel(1024);
        let state = CoordinatorState {
            queue: ParticipantQueue::new(config.queue.capacity),
            cooldowns: CooldownRegistry::new(config.cooldown.leave_cooldown()),
            ledger: ViolationLedger::from_records(records),
            round: None,
            deferred: HashMap::new(),
            grace: HashMap::new(),
            grace_tasks: HashMap::new(),
        };

        Ok(Arc::new(Self {
            config,
            state: Mutex::new(state),
            notifier,
            store,
            persist_lock: Mutex::new(()),
            event_tx,
        }))
    }

    pub fn config(&self) -> &KeenConfig {
        &self.config
    }

    /// Subscribe to coordinator events.
    pub fn subscribe(&self) -> broadcast::Receiver<KeenEvent> {
        self.event_tx.subscribe()
    }

    /// Admit a participant to the queue; returns their 1-based position.
    ///
    /// Filling the queue opens a ready check; passing half full pings the
    /// interest set.
    #[instrument(skip(self, participant), fields(participant = %participant.id))]
    pub async fn join(self: &Arc<Self>, participant: Participant) -> KeenResult<usize> {
        let mut effects = Effects::default();
        let position = {
            let mut state = self.state.lock().await;
            self.admit_locked(&mut state, participant, Instant::now(), &mut effects)?
        };
        self.apply(effects).await;
        Ok(position)
    }

    /// Shared admission path for manual joins and confirmed deferred joins.
    pub(crate) fn admit_locked(
        &self,
        state: &mut CoordinatorState,
        participant: Participant,
        now: Instant,
        effects: &mut Effects,
    ) -> KeenResult<usize> {
        let id = participant.id;
        let position = match state.queue.join(participant.clone(), now) {
            JoinOutcome::Admitted { position } => position,
            JoinOutcome::AlreadyQueued => {
                debug!(participant = %id, "Join rejected: already queued");
                return Err(KeenError::AlreadyQueued(id));
            }
            JoinOutcome::CapacityReached => {
                debug!(participant = %id, "Join rejected: queue full");
                return Err(KeenError::CapacityReached {
                    capacity: state.queue.capacity(),
                });
            }
        };

        info!(
            participant = %id,
            position = position,
            size = state.queue.size(),
            "Participant joined"
        );

        if state.grace.remove(&id).is_some() {
            effects.event(KeenEvent::GraceCancelled {
                participant: participant.clone(),
            });
        }
        if let Some(deferred) = state.deferred.remove(&id) {
            deferred.cancel();
            effects.event(KeenEvent::DeferredCancelled {
                participant: participant.clone(),
            });
        }

        effects.event(KeenEvent::Joined {
            participant,
            position,
        });

        match state.queue.fill() {
            Fill::Full => {
                if state.round.is_none() {
                    effects.launch = Some(self.open_round_locked(state, now));
                } else {
                    debug!("Queue full but a ready check is already active");
                }
            }
            Fill::OverHalf => {
                let interested = state.queue.interested().to_vec();
                if !interested.is_empty() {
                    effects.notice(Notice::InterestAlert {
                        interested,
                        queued: state.queue.size(),
                        capacity: state.queue.capacity(),
                    });
                }
            }
            Fill::Open => {}
        }

        Ok(position)
    }

    /// Leave the queue.
    ///
    /// Leaving is always penalized: a violation is recorded and a cooldown
    /// starts, during which a further leave is refused with the time left,
    /// whether or not the participant has rejoined. A participant who is not
    /// queued but has a grace window or deferred join pending cancels it
    /// instead, without penalty.
    #[instrument(skip(self, id), fields(participant = %id))]
    pub async fn leave(self: &Arc<Self>, id: ParticipantId) -> KeenResult<LeaveOutcome> {
        let mut effects = Effects::default();
        let outcome = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let now = Instant::now();
            let remaining = state.cooldowns.remaining(&id, now);

            if !state.queue.contains(&id) {
                if let Some(grace) = state.grace.remove(&id) {
                    info!(participant = %id, "Grace re-admission cancelled by leave");
                    effects.event(KeenEvent::GraceCancelled {
                        participant: grace.participant,
                    });
                    LeaveOutcome::GraceCancelled
                } else if let Some(deferred) = state.deferred.remove(&id) {
                    info!(participant = %id, "Deferred join cancelled by leave");
                    effects.event(KeenEvent::DeferredCancelled {
                        participant: deferred.participant.clone(),
                    });
                    deferred.cancel();
                    LeaveOutcome::DeferredCancelled
                } else if !remaining.is_zero() {
                    debug!(
                        participant = %id,
                        remaining_secs = remaining.as_secs(),
                        "Leave rejected: on cooldown"
                    );
                    return Err(KeenError::OnCooldown {
                        participant: id,
                        remaining,
                    });
                } else {
                    debug!(participant = %id, "Leave rejected: not queued");
                    return Err(KeenError::NotQueued(id));
                }
            } else {
                if !remaining.is_zero() {
                    debug!(
                        participant = %id,
                        remaining_secs = remaining.as_secs(),
                        "Leave rejected: on cooldown"
                    );
                    return Err(KeenError::OnCooldown {
                        participant: id,
                        remaining,
                    });
                }

                let (entry, position) = match state.queue.leave(&id) {
                    RemoveOutcome::Removed { entry, position } => (entry, position),
                    RemoveOutcome::NotQueued => return Err(KeenError::NotQueued(id)),
                };
                let participant = entry.participant;
                let cooldown_until = state.cooldowns.penalize(id, now);
                state.record_violation(&participant, ViolationReason::Left);
                effects.ledger_dirty = true;

                if let Some(round) = state.round.as_mut() {
                    if round.withdraw(&id) {
                        info!(
                            participant = %id,
                            round_id = %round.id,
                            remaining = round.remaining(),
                            "Participant withdrawn from active ready check"
                        );
                        round.wake();
                    }
                }

                effects.notice(Notice::Left {
                    participant: participant.clone(),
                });
                effects.event(KeenEvent::Left {
                    participant,
                    cooldown_until,
                });
                LeaveOutcome::Removed {
                    position,
                    cooldown_until,
                }
            }
        };

        self.apply(effects).await;
        Ok(outcome)
    }

    /// Toggle interest-set membership; returns whether the participant is
    /// now interested.
    #[instrument(skip(self, participant), fields(participant = %participant.id))]
    pub async fn toggle_interest(&self, participant: Participant) -> KeenResult<bool> {
        let mut state = self.state.lock().await;
        let interested = match state.queue.toggle_interest(participant.clone()) {
            crate::queue::InterestToggle::Added => true,
            crate::queue::InterestToggle::Removed => false,
            crate::queue::InterestToggle::AlreadyQueued => {
                return Err(KeenError::AlreadyQueued(participant.id));
            }
        };
        drop(state);

        debug!(interested = interested, "Interest toggled");
        let _ = self.event_tx.send(KeenEvent::InterestChanged {
            participant,
            interested,
        });
        Ok(interested)
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock().await;
        QueueSnapshot {
            capacity: state.queue.capacity(),
            slots: state
                .queue
                .entries()
                .iter()
                .enumerate()
                .map(|(i, e)| QueueSlot {
                    participant: e.participant.clone(),
                    position: i + 1,
                    joined_at: e.joined_at,
                })
                .collect(),
            interested: state.queue.interested().to_vec(),
            round_active: state.round.is_some(),
        }
    }

    /// Cooldown left before `id` may leave again; zero when unrestricted.
    pub async fn remaining_cooldown(&self, id: ParticipantId) -> Duration {
        self.state
            .lock()
            .await
            .cooldowns
            .remaining(&id, Instant::now())
    }

    /// Number of stored cooldown entries, including lapsed ones not yet
    /// purged by a sweep.
    pub async fn cooldown_entries(&self) -> usize {
        self.state.lock().await.cooldowns.len()
    }

    pub async fn violations(&self) -> Vec<ViolationRecord> {
        self.state.lock().await.ledger.all().to_vec()
    }

    /// Violation counts per participant in order of first appearance.
    pub async fn violation_counts(&self) -> Vec<(Participant, usize)> {
        self.state.lock().await.ledger.aggregate_by_participant()
    }

    /// Wipe the violation ledger. Privileged.
    #[instrument(skip(self))]
    pub async fn clear_violations(&self, authority: Authority) -> KeenResult<usize> {
        if authority != Authority::Privileged {
            warn!("Unprivileged attempt to clear the violation ledger");
            return Err(KeenError::Unauthorized);
        }

        let count = self.state.lock().await.ledger.clear();
        info!(count = count, "Violation ledger cleared");
        self.persist_ledger().await;
        let _ = self.event_tx.send(KeenEvent::ViolationsCleared { count });
        Ok(count)
    }

    pub async fn round_active(&self) -> bool {
        self.state.lock().await.round.is_some()
    }

    pub async fn active_round(&self) -> Option<RoundView> {
        self.state.lock().await.round.as_ref().map(ReadyCheck::view)
    }

    /// Confirm presence in answer to the broadcast identified by `handle`.
    ///
    /// Serves both ready checks and deferred-admission confirmations.
    #[instrument(skip(self, handle, id), fields(handle = %handle, participant = %id))]
    pub async fn confirm(&self, handle: &BroadcastHandle, id: ParticipantId) -> ConfirmOutcome {
        self.respond(handle, id, true).await
    }

    /// Answer "no" to a deferred-admission confirmation.
    #[instrument(skip(self, handle, id), fields(handle = %handle, participant = %id))]
    pub async fn decline(&self, handle: &BroadcastHandle, id: ParticipantId) -> ConfirmOutcome {
        self.respond(handle, id, false).await
    }

    async fn respond(&self, handle: &BroadcastHandle, id: ParticipantId, yes: bool) -> ConfirmOutcome {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if let Some(round) = state
            .round
            .as_mut()
            .filter(|r| !handle.is_detached() && r.handle.as_ref() == Some(handle))
        {
            if !yes {
                return ConfirmOutcome::Ignored(IgnoreReason::DeclineNotSupported);
            }
            return match round.confirm(&id) {
                ConfirmStep::Accepted {
                    participant,
                    remaining,
                } => {
                    debug!(round_id = %round.id, remaining = remaining, "Confirmation accepted");
                    if remaining == 0 {
                        round.wake();
                    }
                    let _ = self.event_tx.send(KeenEvent::Confirmed {
                        round_id: round.id,
                        participant,
                        remaining,
                    });
                    ConfirmOutcome::Accepted { remaining }
                }
                ConfirmStep::Duplicate => ConfirmOutcome::Duplicate,
                ConfirmStep::NotExpected => {
                    debug!(round_id = %round.id, "Confirmation from outside the round snapshot");
                    ConfirmOutcome::Ignored(IgnoreReason::NotParticipant)
                }
            };
        }

        if let Some(entry) = state.deferred.values_mut().find(|e| e.awaits(handle)) {
            if entry.participant.id != id {
                debug!("Deferred confirmation from someone else");
                return ConfirmOutcome::Ignored(IgnoreReason::NotParticipant);
            }
            return if entry.answer(yes) {
                debug!(answer = yes, "Deferred answer recorded");
                ConfirmOutcome::Accepted { remaining: 0 }
            } else {
                ConfirmOutcome::Duplicate
            };
        }

        error!("Confirmation matches no open round or deferred request, dropping it");
        ConfirmOutcome::Ignored(IgnoreReason::UnknownHandle)
    }

    /// Cancel every pending timer and flush the ledger one last time.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.lock().await;
            state.grace.clear();
            for (_, task) in state.grace_tasks.drain() {
                task.abort();
            }
            for (_, deferred) in state.deferred.drain() {
                deferred.cancel();
            }
        }
        self.persist_ledger().await;
        info!("Coordinator shut down");
    }

    /// Carry out effects gathered under the lock.
    pub(crate) async fn apply(self: &Arc<Self>, effects: Effects) {
        for event in effects.events {
            let _ = self.event_tx.send(event);
        }

        if effects.ledger_dirty {
            self.persist_ledger().await;
        }

        for notice in &effects.notices {
            self.post(notice).await;
        }

        if let Some(launch) = effects.launch {
            self.spawn_round(launch);
        }
    }

    /// Broadcast a notice, logging rather than propagating failure.
    pub(crate) async fn post(&self, notice: &Notice) -> Option<BroadcastHandle> {
        match self.notifier.broadcast(notice).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, notice = %notice, "Broadcast failed");
                None
            }
        }
    }

    /// Mirror the in-memory ledger to the store.
    ///
    /// Writers queue on `persist_lock` and read the ledger only once they
    /// hold it, so the last write always carries the latest state. A failed
    /// write is logged; the next successful one catches the store up.
    async fn persist_ledger(&self) {
        let _writer = self.persist_lock.lock().await;
        let records = self.state.lock().await.ledger.all().to_vec();

        if let Err(e) = self.store.persist_violations(&records).await {
            warn!(error = %e, records = records.len(), "Failed to persist violation ledger");
        }
    }
}
