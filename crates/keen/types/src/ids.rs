//! Strongly-typed identifiers for Keen entities
//!
//! Participants are keyed by a stable numeric ID; the display handle is an
//! attribute and never takes part in equality.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Stable identity of a participant (e.g. a chat platform user ID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(u64);

impl ParticipantId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ParticipantId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "participant:{}", self.0)
    }
}

/// A participant: identity plus the handle used when addressing them.
///
/// Two participants are equal when their IDs are equal, whatever their
/// handles say.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub handle: String,
}

impl Participant {
    pub fn new(id: impl Into<ParticipantId>, handle: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handle: handle.into(),
        }
    }
}

impl PartialEq for Participant {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Participant {}

impl Hash for Participant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.handle)
    }
}

/// Unique identifier for a ready-check round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoundId(Uuid);

impl RoundId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round:{}", self.0)
    }
}

/// Opaque handle of a posted broadcast.
///
/// Confirmations arrive tagged with the handle of the message they answer,
/// which is how a confirmation is tied to one specific round or deferred
/// request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BroadcastHandle(String);

impl BroadcastHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A handle minted locally when the notifier could not post.
    ///
    /// Nothing outside the process knows it, so no confirmation can ever
    /// correlate with it; the wait it guards simply runs to its deadline.
    pub fn detached() -> Self {
        Self(format!("detached:{}", Uuid::new_v4()))
    }

    pub fn is_detached(&self) -> bool {
        self.0.starts_with("detached:")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BroadcastHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
