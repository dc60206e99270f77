//! Deferred admissions.
//!
//! A participant schedules a join for later. When the delay elapses they are
//! asked to confirm; a "yes" within the window admits them, a "no" or
//! silence records a violation. At most one pending entry per participant.
//! Each entry carries a ticket; a timer that wakes to find a different
//! ticket (or none) has been superseded or cancelled and does nothing.

use std::sync::Arc;
use std::time::Duration;

use keen_types::{BroadcastHandle, Notice, Participant, ParticipantId, ViolationReason};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::coordinator::{Coordinator, Effects};
use crate::error::{KeenError, KeenResult};
use crate::events::KeenEvent;

pub(crate) enum DeferredPhase {
    Delaying,
    Confirming {
        handle: Option<BroadcastHandle>,
        deadline: Instant,
    },
}

pub(crate) struct DeferredEntry {
    pub(crate) ticket: Uuid,
    pub(crate) participant: Participant,
    pub(crate) fire_at: Instant,
    pub(crate) phase: DeferredPhase,
    answer: Option<bool>,
    wake: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl DeferredEntry {
    fn new(participant: Participant, fire_at: Instant) -> Self {
        Self {
            ticket: Uuid::new_v4(),
            participant,
            fire_at,
            phase: DeferredPhase::Delaying,
            answer: None,
            wake: Arc::new(Notify::new()),
            task: None,
        }
    }

    /// Whether this entry is waiting on an answer to `handle`.
    pub(crate) fn awaits(&self, handle: &BroadcastHandle) -> bool {
        !handle.is_detached()
            && matches!(&self.phase, DeferredPhase::Confirming { handle: Some(h), .. } if h == handle)
    }

    /// Record the first answer. Later answers are ignored.
    pub(crate) fn answer(&mut self, yes: bool) -> bool {
        if self.answer.is_some() {
            return false;
        }
        self.answer = Some(yes);
        self.wake.notify_one();
        true
    }

    /// Stop the timer task.
    pub(crate) fn cancel(self) {
        if let Some(task) = self.task {
            task.abort();
        }
    }
}

/// Public view of a pending deferred join.
#[derive(Debug, Clone)]
pub struct DeferredView {
    pub participant: Participant,
    pub fire_at: Instant,
    /// Confirmation deadline, once the delay has elapsed.
    pub confirm_by: Option<Instant>,
}

impl Coordinator {
    /// Schedule `participant` to be offered a queue slot after `delay`.
    ///
    /// Returns when the confirmation request will be posted.
    #[instrument(skip(self, participant), fields(participant = %participant.id, delay_secs = delay.as_secs()))]
    pub async fn schedule_deferred(
        self: &Arc<Self>,
        participant: Participant,
        delay: Duration,
    ) -> KeenResult<Instant> {
        if delay.is_zero() || delay > self.config.deferred.max_delay() {
            debug!("Deferred join rejected: delay out of range");
            return Err(KeenError::InvalidDelay(delay));
        }

        let id = participant.id;
        let fire_at = {
            let mut state = self.state.lock().await;
            if state.queue.contains(&id) {
                return Err(KeenError::AlreadyQueued(id));
            }
            if state.deferred.contains_key(&id) {
                return Err(KeenError::AlreadyDeferred(id));
            }

            let fire_at = Instant::now() + delay;
            let mut entry = DeferredEntry::new(participant.clone(), fire_at);
            let ticket = entry.ticket;
            let this = Arc::clone(self);
            entry.task = Some(tokio::spawn(async move {
                this.run_deferred(ticket, id, fire_at).await
            }));
            state.deferred.insert(id, entry);
            fire_at
        };

        info!("Deferred join scheduled");
        let _ = self.event_tx.send(KeenEvent::DeferredScheduled {
            participant,
            fire_at,
        });
        Ok(fire_at)
    }

    /// Drop a pending deferred join without penalty.
    #[instrument(skip(self, id), fields(participant = %id))]
    pub async fn cancel_deferred(&self, id: ParticipantId) -> KeenResult<()> {
        let entry = self
            .state
            .lock()
            .await
            .deferred
            .remove(&id)
            .ok_or(KeenError::NotDeferred(id))?;

        let participant = entry.participant.clone();
        entry.cancel();
        info!("Deferred join cancelled");
        let _ = self
            .event_tx
            .send(KeenEvent::DeferredCancelled { participant });
        Ok(())
    }

    pub async fn pending_deferred(&self) -> Vec<DeferredView> {
        let state = self.state.lock().await;
        let mut views: Vec<DeferredView> = state
            .deferred
            .values()
            .map(|e| DeferredView {
                participant: e.participant.clone(),
                fire_at: e.fire_at,
                confirm_by: match &e.phase {
                    DeferredPhase::Delaying => None,
                    DeferredPhase::Confirming { deadline, .. } => Some(*deadline),
                },
            })
            .collect();
        views.sort_by_key(|v| v.fire_at);
        views
    }

    async fn run_deferred(self: Arc<Self>, ticket: Uuid, id: ParticipantId, fire_at: Instant) {
        tokio::time::sleep_until(fire_at).await;

        let window = self.config.deferred.confirmation_window();
        let (participant, wake, deadline) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let queued = state.queue.contains(&id);

            let Some(entry) = state.deferred.get_mut(&id).filter(|e| e.ticket == ticket) else {
                debug!(participant = %id, "Deferred timer superseded");
                return;
            };
            if queued {
                info!(participant = %id, "Deferred participant already queued, dropping entry");
                state.deferred.remove(&id);
                return;
            }

            let deadline = Instant::now() + window;
            entry.phase = DeferredPhase::Confirming {
                handle: None,
                deadline,
            };
            (entry.participant.clone(), Arc::clone(&entry.wake), deadline)
        };

        let notice = Notice::DeferredConfirmationRequested {
            participant: participant.clone(),
            window,
        };
        let handle = match self.post(&notice).await {
            Some(handle) => handle,
            None => {
                warn!(participant = %id, "Deferred confirmation request was not delivered");
                BroadcastHandle::detached()
            }
        };

        {
            let mut state = self.state.lock().await;
            match state.deferred.get_mut(&id).filter(|e| e.ticket == ticket) {
                Some(entry) => {
                    if let DeferredPhase::Confirming { handle: slot, .. } = &mut entry.phase {
                        *slot = Some(handle.clone());
                    }
                }
                None => return,
            }
        }

        let _ = self.event_tx.send(KeenEvent::DeferredAwaitingConfirmation {
            participant,
            handle,
            deadline,
        });

        let poll = self.config.ready_check.poll_interval();
        loop {
            {
                let state = self.state.lock().await;
                match state.deferred.get(&id) {
                    Some(entry) if entry.ticket == ticket => {
                        if entry.answer.is_some() {
                            break;
                        }
                    }
                    _ => return,
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let next = deadline.min(now + poll);
            tokio::select! {
                _ = wake.notified() => {}
                _ = tokio::time::sleep_until(next) => {}
            }
        }

        self.finish_deferred(ticket, id).await;
    }

    async fn finish_deferred(self: &Arc<Self>, ticket: Uuid, id: ParticipantId) {
        let mut effects = Effects::default();
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            let entry = match state.deferred.remove(&id) {
                Some(entry) if entry.ticket == ticket => entry,
                Some(other) => {
                    state.deferred.insert(id, other);
                    return;
                }
                None => return,
            };
            let participant = entry.participant.clone();

            match entry.answer {
                Some(true) => {
                    match self.admit_locked(state, participant.clone(), Instant::now(), &mut effects) {
                        Ok(position) => {
                            info!(participant = %id, position = position, "Deferred participant admitted");
                            effects.event(KeenEvent::DeferredAdmitted {
                                participant,
                                position,
                            });
                        }
                        Err(KeenError::CapacityReached { .. }) => {
                            info!(participant = %id, "Deferred participant confirmed but the queue is full");
                            effects.notice(Notice::DeferredQueueFull {
                                participant: participant.clone(),
                            });
                            effects.event(KeenEvent::DeferredRejected { participant });
                        }
                        Err(e) => {
                            debug!(participant = %id, error = %e, "Deferred admission skipped");
                            effects.event(KeenEvent::DeferredRejected { participant });
                        }
                    }
                }
                answer => {
                    let reason = if answer.is_some() {
                        ViolationReason::DeclinedDeferred
                    } else {
                        ViolationReason::DeferredExpired
                    };
                    state.record_violation(&participant, reason);
                    effects.ledger_dirty = true;
                    effects.notice(Notice::DeferredPenalized {
                        participant: participant.clone(),
                        expired: answer.is_none(),
                    });
                    effects.event(KeenEvent::DeferredPenalized {
                        participant,
                        reason,
                    });
                }
            }
        }

        self.apply(effects).await;
    }
}
