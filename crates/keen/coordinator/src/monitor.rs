//! Idle expiry.
//!
//! The `IdleExpiryMonitor` sweeps the queue on a fixed interval and evicts
//! anyone who has sat in it longer than the idle threshold. Each evicted
//! participant gets a grace window; when it ends they are put back at their
//! old position unless they rejoined on their own or the queue is full.
//! Sweeps are skipped while a ready check is running, since the round's
//! snapshot owns those slots.

use std::sync::Arc;

use keen_types::{Notice, Participant, ParticipantId};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::coordinator::{Coordinator, Effects};
use crate::events::{GraceLapse, KeenEvent};
use crate::queue::{JoinOutcome, RemoveOutcome};

/// A pending grace re-admission.
///
/// Everyone evicted by the same sweep shares a cohort and is re-admitted by
/// one task, in their original order.
pub(crate) struct GraceEntry {
    cohort: Uuid,
    pub(crate) participant: Participant,
    /// 1-based position held before the sweep removed anyone.
    position: usize,
    /// Participants ahead of this one who were not evicted with it.
    ahead: usize,
}

/// Background idle sweeper. Stops when dropped.
pub struct IdleExpiryMonitor {
    handle: Option<JoinHandle<()>>,
}

impl IdleExpiryMonitor {
    /// Spawn the sweep loop. The first sweep runs one interval from now.
    pub fn start(coordinator: Arc<Coordinator>) -> Self {
        let period = coordinator.config().idle.sweep_interval();
        info!(interval_secs = period.as_secs(), "Starting idle expiry monitor");

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = coordinator.sweep_idle().await;
                debug!(evicted = evicted.len(), "Idle sweep finished");
            }
        });

        Self {
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            info!("Idle expiry monitor stopped");
        }
    }
}

impl Drop for IdleExpiryMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Coordinator {
    /// Run one idle sweep now. Returns the evicted participants.
    ///
    /// Also purges lapsed cooldown entries.
    #[instrument(skip(self))]
    pub async fn sweep_idle(self: &Arc<Self>) -> Vec<Participant> {
        let mut effects = Effects::default();
        let mut evicted = Vec::new();
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let now = Instant::now();

            let purged = state.cooldowns.purge_expired(now);
            if purged > 0 {
                debug!(purged = purged, "Purged lapsed cooldowns");
            }

            if state.round.is_some() {
                debug!("Ready check active, skipping idle sweep");
                return evicted;
            }

            let threshold = self.config.idle.idle_threshold();
            let grace = self.config.idle.grace_window();

            let idle = state.queue.idle_since(now, threshold);
            if idle.is_empty() {
                return evicted;
            }

            let cohort = Uuid::new_v4();
            for (evicted_ahead, (participant, position)) in idle.into_iter().enumerate() {
                let id = participant.id;
                if let RemoveOutcome::NotQueued = state.queue.leave(&id) {
                    continue;
                }
                info!(
                    participant = %id,
                    position = position,
                    grace_secs = grace.as_secs(),
                    "Evicting idle participant"
                );

                state.grace.insert(
                    id,
                    GraceEntry {
                        cohort,
                        participant: participant.clone(),
                        position,
                        ahead: position - 1 - evicted_ahead,
                    },
                );
                effects.notice(Notice::Evicted {
                    participant: participant.clone(),
                    grace,
                });
                effects.event(KeenEvent::Evicted {
                    participant: participant.clone(),
                    position,
                });
                evicted.push(participant);
            }

            let this = Arc::clone(self);
            let until = now + grace;
            let task = tokio::spawn(async move { this.run_grace(cohort, until).await });
            state.grace_tasks.insert(cohort, task);
        }

        self.apply(effects).await;
        evicted
    }

    /// Re-admit what is left of a cohort once its grace window ends.
    ///
    /// Entries go back in ascending original position. Each lands behind the
    /// participants that were ahead of it and stayed, and behind cohort
    /// members already put back, so relative order survives cancellations.
    async fn run_grace(self: Arc<Self>, cohort: Uuid, until: Instant) {
        tokio::time::sleep_until(until).await;

        let mut effects = Effects::default();
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            state.grace_tasks.remove(&cohort);

            let ids: Vec<ParticipantId> = state
                .grace
                .iter()
                .filter(|(_, e)| e.cohort == cohort)
                .map(|(id, _)| *id)
                .collect();
            let mut entries: Vec<GraceEntry> =
                ids.iter().filter_map(|id| state.grace.remove(id)).collect();
            entries.sort_by_key(|e| e.position);

            let now = Instant::now();
            let mut readmitted = 0;
            for entry in entries {
                let id = entry.participant.id;
                let participant = entry.participant;
                match state
                    .queue
                    .insert_at(participant.clone(), entry.ahead + readmitted, now)
                {
                    JoinOutcome::Admitted { position } => {
                        readmitted += 1;
                        info!(participant = %id, position = position, "Grace re-admission");
                        effects.notice(Notice::GraceRejoined {
                            participant: participant.clone(),
                            position,
                        });
                        effects.event(KeenEvent::GraceRejoined {
                            participant,
                            position,
                        });
                    }
                    JoinOutcome::AlreadyQueued => {
                        debug!(participant = %id, "Grace lapsed: already queued");
                        effects.event(KeenEvent::GraceLapsed {
                            participant,
                            reason: GraceLapse::AlreadyQueued,
                        });
                    }
                    JoinOutcome::CapacityReached => {
                        debug!(participant = %id, "Grace lapsed: queue full");
                        effects.event(KeenEvent::GraceLapsed {
                            participant,
                            reason: GraceLapse::QueueFull,
                        });
                    }
                }
            }

            if state.queue.is_full() && state.round.is_none() {
                effects.launch = Some(self.open_round_locked(state, now));
            }
        }

        self.apply(effects).await;
    }
}
