//! Ready-check rounds.
//!
//! A round opens when the queue fills. It snapshots the queue, posts a
//! confirmation request and waits until every snapshot participant has
//! confirmed or the window closes, whichever comes first. Confirmations
//! arrive through [`Coordinator::confirm`] and wake the waiter; the waiter
//! also re-checks on every poll tick.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use keen_types::{BroadcastHandle, Notice, Participant, ParticipantId, RoundId, ViolationReason};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::coordinator::{Coordinator, CoordinatorState, Effects, RoundView};
use crate::events::KeenEvent;
use crate::queue::JoinOutcome;

/// State of the active round.
pub(crate) struct ReadyCheck {
    pub(crate) id: RoundId,
    /// Set once the confirmation request has been posted.
    pub(crate) handle: Option<BroadcastHandle>,
    expected: Vec<Participant>,
    confirmed: HashSet<ParticipantId>,
    deadline: Instant,
    wake: Arc<Notify>,
}

pub(crate) enum ConfirmStep {
    Accepted {
        participant: Participant,
        remaining: usize,
    },
    Duplicate,
    NotExpected,
}

impl ReadyCheck {
    pub(crate) fn new(expected: Vec<Participant>, deadline: Instant) -> Self {
        Self {
            id: RoundId::generate(),
            handle: None,
            expected,
            confirmed: HashSet::new(),
            deadline,
            wake: Arc::new(Notify::new()),
        }
    }

    pub(crate) fn confirm(&mut self, id: &ParticipantId) -> ConfirmStep {
        let Some(participant) = self.expected.iter().find(|p| &p.id == id).cloned() else {
            return ConfirmStep::NotExpected;
        };
        if !self.confirmed.insert(*id) {
            return ConfirmStep::Duplicate;
        }
        ConfirmStep::Accepted {
            participant,
            remaining: self.remaining(),
        }
    }

    /// Drop a participant from the expected set. Returns false if they were
    /// not part of the round.
    pub(crate) fn withdraw(&mut self, id: &ParticipantId) -> bool {
        let before = self.expected.len();
        self.expected.retain(|p| &p.id != id);
        self.confirmed.remove(id);
        self.expected.len() != before
    }

    pub(crate) fn remaining(&self) -> usize {
        self.expected.len() - self.confirmed.len()
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn wake(&self) {
        self.wake.notify_one();
    }

    pub(crate) fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    pub(crate) fn participants(&self) -> &[Participant] {
        &self.expected
    }

    /// `(confirmed, missed)`, both in snapshot order.
    pub(crate) fn split(&self) -> (Vec<Participant>, Vec<Participant>) {
        self.expected
            .iter()
            .cloned()
            .partition(|p| self.confirmed.contains(&p.id))
    }

    pub(crate) fn view(&self) -> RoundView {
        let (confirmed, _) = self.split();
        RoundView {
            id: self.id,
            handle: self.handle.clone(),
            participants: self.expected.clone(),
            confirmed,
            deadline: self.deadline,
        }
    }
}

/// What the spawned round task needs to know.
pub(crate) struct RoundLaunch {
    id: RoundId,
    participants: Vec<Participant>,
    deadline: Instant,
}

impl Coordinator {
    /// Install a new round over the current queue. The caller has checked
    /// that no round is active.
    pub(crate) fn open_round_locked(&self, state: &mut CoordinatorState, now: Instant) -> RoundLaunch {
        let participants: Vec<Participant> = state
            .queue
            .snapshot()
            .into_iter()
            .map(|(p, _)| p)
            .collect();
        let deadline = now + self.config.ready_check.confirmation_window();
        let round = ReadyCheck::new(participants.clone(), deadline);

        info!(
            round_id = %round.id,
            participants = participants.len(),
            "Queue full, opening ready check"
        );

        let launch = RoundLaunch {
            id: round.id,
            participants,
            deadline,
        };
        state.round = Some(round);
        launch
    }

    /// Start the round task. Boxed because a resolving round can open the
    /// next one.
    pub(crate) fn spawn_round(self: &Arc<Self>, launch: RoundLaunch) {
        let round: Pin<Box<dyn Future<Output = ()> + Send>> =
            Box::pin(Arc::clone(self).run_round(launch));
        tokio::spawn(round);
    }

    #[instrument(skip(self, launch), fields(round_id = %launch.id))]
    async fn run_round(self: Arc<Self>, launch: RoundLaunch) {
        let notice = Notice::ReadyCheckStarted {
            participants: launch.participants.clone(),
            window: self.config.ready_check.confirmation_window(),
        };
        let handle = match self.post(&notice).await {
            Some(handle) => handle,
            None => {
                warn!("Ready check request was not delivered, round will run to its deadline");
                BroadcastHandle::detached()
            }
        };

        let wake = {
            let mut state = self.state.lock().await;
            match state.round.as_mut() {
                Some(round) if round.id == launch.id => {
                    round.handle = Some(handle.clone());
                    round.waker()
                }
                _ => {
                    error!("Round disappeared before its request was posted");
                    return;
                }
            }
        };

        let _ = self.event_tx.send(KeenEvent::RoundStarted {
            round_id: launch.id,
            handle,
            participants: launch.participants.clone(),
            deadline: launch.deadline,
        });

        let poll = self.config.ready_check.poll_interval();
        loop {
            {
                let state = self.state.lock().await;
                match state.round.as_ref() {
                    Some(round) if round.id == launch.id => {
                        if round.is_complete() {
                            debug!("All participants confirmed");
                            break;
                        }
                    }
                    _ => {
                        error!("Round replaced while waiting for confirmations");
                        return;
                    }
                }
            }

            let now = Instant::now();
            if now >= launch.deadline {
                debug!("Confirmation window closed");
                break;
            }
            let next = launch.deadline.min(now + poll);
            tokio::select! {
                _ = wake.notified() => {}
                _ = tokio::time::sleep_until(next) => {}
            }
        }

        self.resolve_round(launch.id).await;
    }

    /// Settle a finished round.
    ///
    /// A full confirmation removes the snapshot from the queue as a group.
    /// Otherwise the snapshot is removed, every non-confirmer gets a
    /// violation and the confirmers are re-queued with fresh timestamps.
    /// Non-confirmers are not given a cooldown.
    async fn resolve_round(self: &Arc<Self>, round_id: RoundId) {
        let mut effects = Effects::default();
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            let round = match state.round.take() {
                Some(round) if round.id == round_id => round,
                other => {
                    state.round = other;
                    error!(round_id = %round_id, "Resolving a round that is not active");
                    return;
                }
            };

            let now = Instant::now();
            let (confirmed, missed) = round.split();
            let snapshot: Vec<ParticipantId> = round.participants().iter().map(|p| p.id).collect();
            state.queue.remove_all(&snapshot);

            if missed.is_empty() && !confirmed.is_empty() {
                info!(
                    round_id = %round_id,
                    participants = confirmed.len(),
                    "Ready check cleared"
                );
                effects.notice(Notice::ReadyCheckCleared {
                    participants: confirmed.clone(),
                });
                effects.event(KeenEvent::RoundCleared {
                    round_id,
                    participants: confirmed,
                });
            } else {
                info!(
                    round_id = %round_id,
                    confirmed = confirmed.len(),
                    missed = missed.len(),
                    "Ready check timed out"
                );

                for participant in &missed {
                    state.record_violation(participant, ViolationReason::MissedReadyCheck);
                    effects.ledger_dirty = true;
                    effects.notice(Notice::MissedReadyCheck {
                        participant: participant.clone(),
                    });
                }

                let mut requeued = Vec::with_capacity(confirmed.len());
                for participant in confirmed {
                    match state.queue.join(participant.clone(), now) {
                        JoinOutcome::Admitted { .. } => requeued.push(participant),
                        outcome => debug!(
                            participant = %participant.id,
                            outcome = ?outcome,
                            "Confirmer could not be re-queued"
                        ),
                    }
                }
                if !requeued.is_empty() {
                    effects.notice(Notice::ConfirmersRequeued {
                        participants: requeued.clone(),
                    });
                }
                effects.event(KeenEvent::RoundResolved {
                    round_id,
                    missed,
                    requeued,
                });

                if state.queue.is_full() {
                    effects.launch = Some(self.open_round_locked(state, now));
                }
            }
        }

        self.apply(effects).await;
    }
}
