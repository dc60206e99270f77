//! Structured notices posted to the coordination channel.
//!
//! Rendering belongs to the command layer; `Display` gives a plain-text
//! fallback suitable for logs and simple notifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::ids::Participant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notice {
    /// The queue is more than half full; addressed to the interest set.
    InterestAlert {
        interested: Vec<Participant>,
        queued: usize,
        capacity: usize,
    },

    /// The queue filled and a ready check began.
    ReadyCheckStarted {
        participants: Vec<Participant>,
        window: Duration,
    },

    /// Every snapshot participant confirmed.
    ReadyCheckCleared { participants: Vec<Participant> },

    /// A snapshot participant failed to confirm in time.
    MissedReadyCheck { participant: Participant },

    /// Participants who confirmed were put back in the queue.
    ConfirmersRequeued { participants: Vec<Participant> },

    /// A participant left the queue voluntarily.
    Left { participant: Participant },

    /// A participant sat in the queue too long and was removed.
    Evicted {
        participant: Participant,
        grace: Duration,
    },

    /// An evicted participant was put back after the grace window.
    GraceRejoined {
        participant: Participant,
        position: usize,
    },

    /// A deferred participant is asked whether they still want in.
    DeferredConfirmationRequested {
        participant: Participant,
        window: Duration,
    },

    /// A deferred participant confirmed but the queue had no room.
    DeferredQueueFull { participant: Participant },

    /// A deferred participant declined or never answered.
    DeferredPenalized {
        participant: Participant,
        expired: bool,
    },
}

fn join_handles(participants: &[Participant]) -> String {
    participants
        .iter()
        .map(|p| p.handle.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::InterestAlert {
                interested,
                queued,
                capacity,
            } => write!(
                f,
                "{} the queue is more than half full ({}/{})",
                join_handles(interested),
                queued,
                capacity
            ),
            Notice::ReadyCheckStarted {
                participants,
                window,
            } => write!(
                f,
                "{} ready check: confirm within {}s",
                join_handles(participants),
                window.as_secs()
            ),
            Notice::ReadyCheckCleared { .. } => write!(f, "everyone is ready"),
            Notice::MissedReadyCheck { participant } => {
                write!(f, "{} did not ready up in time", participant)
            }
            Notice::ConfirmersRequeued { participants } => {
                write!(f, "{} re-added to the queue", join_handles(participants))
            }
            Notice::Left { participant } => write!(f, "{} left the queue", participant),
            Notice::Evicted { participant, grace } => write!(
                f,
                "{} removed from the queue due to timeout; held for {}s",
                participant,
                grace.as_secs()
            ),
            Notice::GraceRejoined {
                participant,
                position,
            } => write!(f, "{} rejoined the queue at position {}", participant, position),
            Notice::DeferredConfirmationRequested {
                participant,
                window,
            } => write!(
                f,
                "{} still keen? confirm within {}s",
                participant,
                window.as_secs()
            ),
            Notice::DeferredQueueFull { participant } => {
                write!(f, "{} confirmed but the queue is full", participant)
            }
            Notice::DeferredPenalized {
                participant,
                expired,
            } => {
                if *expired {
                    write!(f, "{} never confirmed their deferred join", participant)
                } else {
                    write!(f, "{} declined their deferred join", participant)
                }
            }
        }
    }
}

impl Notice {
    /// Participants this notice addresses directly.
    pub fn mentions(&self) -> Vec<&Participant> {
        match self {
            Notice::InterestAlert { interested, .. } => interested.iter().collect(),
            Notice::ReadyCheckStarted { participants, .. }
            | Notice::ReadyCheckCleared { participants }
            | Notice::ConfirmersRequeued { participants } => participants.iter().collect(),
            Notice::MissedReadyCheck { participant }
            | Notice::Left { participant }
            | Notice::Evicted { participant, .. }
            | Notice::GraceRejoined { participant, .. }
            | Notice::DeferredConfirmationRequested { participant, .. }
            | Notice::DeferredQueueFull { participant }
            | Notice::DeferredPenalized { participant, .. } => vec![participant],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_check_notice_mentions_everyone() {
        let participants = vec![Participant::new(1, "<@1>"), Participant::new(2, "<@2>")];
        let notice = Notice::ReadyCheckStarted {
            participants: participants.clone(),
            window: Duration::from_secs(600),
        };

        assert_eq!(notice.mentions().len(), 2);
        let text = notice.to_string();
        assert!(text.contains("<@1> <@2>"));
        assert!(text.contains("600s"));
    }
}
