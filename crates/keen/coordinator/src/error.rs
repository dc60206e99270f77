//! Error types for keen-coordinator.

use std::time::Duration;

use keen_types::ParticipantId;
use thiserror::Error;

/// Errors returned by coordinator operations.
///
/// Most variants are rejections of a request that left state untouched; see
/// [`KeenError::is_user_rejection`].
#[derive(Debug, Error)]
pub enum KeenError {
    /// Participant already holds a queue entry.
    #[error("{0} is already in the queue")]
    AlreadyQueued(ParticipantId),

    /// Participant holds no queue entry.
    #[error("{0} is not in the queue")]
    NotQueued(ParticipantId),

    /// Queue is full.
    #[error("queue is at capacity ({capacity})")]
    CapacityReached { capacity: usize },

    /// Participant left recently and may not leave again yet.
    #[error("{participant} is on cooldown for another {secs}s", secs = .remaining.as_secs())]
    OnCooldown {
        participant: ParticipantId,
        remaining: Duration,
    },

    /// Participant already has a deferred admission pending.
    #[error("{0} already has a deferred join pending")]
    AlreadyDeferred(ParticipantId),

    /// Participant has no deferred admission pending.
    #[error("{0} has no deferred join pending")]
    NotDeferred(ParticipantId),

    /// Requester lacks the privilege the operation needs.
    #[error("requester is not privileged")]
    Unauthorized,

    /// Deferral delay is zero or beyond the configured maximum.
    #[error("invalid deferral delay of {0:?}")]
    InvalidDelay(Duration),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl KeenError {
    /// Whether this error is an ordinary rejection to report back to the
    /// requester rather than a fault.
    pub fn is_user_rejection(&self) -> bool {
        matches!(
            self,
            KeenError::AlreadyQueued(_)
                | KeenError::NotQueued(_)
                | KeenError::CapacityReached { .. }
                | KeenError::OnCooldown { .. }
                | KeenError::AlreadyDeferred(_)
                | KeenError::NotDeferred(_)
                | KeenError::Unauthorized
                | KeenError::InvalidDelay(_)
        )
    }
}

/// Result type for coordinator operations.
pub type KeenResult<T> = Result<T, KeenError>;
