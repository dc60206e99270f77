//! Events emitted by the coordinator.
//!
//! Subscribers get every state transition, in order, over a broadcast
//! channel. Lagging subscribers lose events; the coordinator never waits on
//! them.

use keen_types::{BroadcastHandle, Participant, RoundId, ViolationReason};
use tokio::time::Instant;

/// Why a grace window ended without a silent re-admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraceLapse {
    /// The participant was already back in the queue.
    AlreadyQueued,
    /// The queue had no room.
    QueueFull,
}

#[derive(Debug, Clone)]
pub enum KeenEvent {
    /// Participant admitted to the queue.
    Joined {
        participant: Participant,
        position: usize,
    },

    /// Participant left the queue and was penalized.
    Left {
        participant: Participant,
        cooldown_until: Instant,
    },

    /// Interest set membership changed.
    InterestChanged {
        participant: Participant,
        interested: bool,
    },

    /// A ready check was posted and is collecting confirmations.
    RoundStarted {
        round_id: RoundId,
        handle: BroadcastHandle,
        participants: Vec<Participant>,
        deadline: Instant,
    },

    /// A snapshot participant confirmed.
    Confirmed {
        round_id: RoundId,
        participant: Participant,
        remaining: usize,
    },

    /// Everyone confirmed; the round's participants left the queue together.
    RoundCleared {
        round_id: RoundId,
        participants: Vec<Participant>,
    },

    /// The deadline passed first.
    RoundResolved {
        round_id: RoundId,
        missed: Vec<Participant>,
        requeued: Vec<Participant>,
    },

    /// Participant evicted for idling.
    Evicted {
        participant: Participant,
        position: usize,
    },

    /// Evicted participant silently re-admitted.
    GraceRejoined {
        participant: Participant,
        position: usize,
    },

    /// Grace window ended without re-admission.
    GraceLapsed {
        participant: Participant,
        reason: GraceLapse,
    },

    /// Grace window cancelled before it ran out.
    GraceCancelled { participant: Participant },

    /// Deferred admission scheduled.
    DeferredScheduled {
        participant: Participant,
        fire_at: Instant,
    },

    /// Deferred delay elapsed; waiting for the participant to confirm.
    DeferredAwaitingConfirmation {
        participant: Participant,
        handle: BroadcastHandle,
        deadline: Instant,
    },

    /// Deferred participant confirmed and was admitted.
    DeferredAdmitted {
        participant: Participant,
        position: usize,
    },

    /// Deferred participant confirmed but could not be admitted.
    DeferredRejected {
        participant: Participant,
    },

    /// Deferred participant declined or never answered.
    DeferredPenalized {
        participant: Participant,
        reason: ViolationReason,
    },

    /// Deferred admission cancelled before completing.
    DeferredCancelled { participant: Participant },

    /// Violation ledger wiped.
    ViolationsCleared { count: usize },
}
