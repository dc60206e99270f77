//! Line-oriented command layer.
//!
//! Each line names the acting participant and a verb:
//!
//! ```text
//! 7:ada join
//! 7:ada defer 30m
//! 9:bo confirm 4
//! ```

use std::sync::Arc;
use std::time::Duration;

use keen_coordinator::{
    Authority, ConfirmOutcome, Coordinator, IgnoreReason, KeenError, LeaveOutcome,
};
use keen_types::{BroadcastHandle, Participant};
use thiserror::Error;
use tokio::time::Instant;

use crate::config::DaemonConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join,
    Leave,
    Interest,
    Queue,
    Cooldown,
    Spanners,
    Clear,
    Confirm(BroadcastHandle),
    Decline(BroadcastHandle),
    Defer(Duration),
    Undefer,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub actor: Participant,
    pub command: Command,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected `<id>:<handle> <command> [argument]`")]
    Malformed,

    #[error("invalid participant `{0}`")]
    BadActor(String),

    #[error("unknown command `{0}`, try `help`")]
    UnknownCommand(String),

    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),

    #[error("invalid duration `{0}`, use e.g. 90s, 30m or 2h")]
    BadDuration(String),
}

pub fn parse(line: &str) -> Result<Request, ParseError> {
    let mut words = line.split_whitespace();
    let actor = words.next().ok_or(ParseError::Malformed)?;
    let verb = words.next().ok_or(ParseError::Malformed)?;
    let arg = words.next();

    let actor = parse_actor(actor)?;
    let command = match verb.to_ascii_lowercase().as_str() {
        "join" | "keen" => Command::Join,
        "leave" | "unkeen" => Command::Leave,
        "interest" | "p" => Command::Interest,
        "queue" | "keeners" => Command::Queue,
        "cooldown" => Command::Cooldown,
        "spanners" => Command::Spanners,
        "clear" | "cleartracker" => Command::Clear,
        "confirm" => Command::Confirm(BroadcastHandle::new(
            arg.ok_or(ParseError::MissingArgument("confirm"))?,
        )),
        "decline" => Command::Decline(BroadcastHandle::new(
            arg.ok_or(ParseError::MissingArgument("decline"))?,
        )),
        "defer" => Command::Defer(parse_duration(
            arg.ok_or(ParseError::MissingArgument("defer"))?,
        )?),
        "undefer" => Command::Undefer,
        "help" => Command::Help,
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };

    Ok(Request { actor, command })
}

fn parse_actor(word: &str) -> Result<Participant, ParseError> {
    let bad = || ParseError::BadActor(word.to_string());
    let (id, handle) = word.split_once(':').ok_or_else(bad)?;
    let id: u64 = id.parse().map_err(|_| bad())?;
    if handle.is_empty() {
        return Err(bad());
    }
    Ok(Participant::new(id, handle))
}

/// `90s`, `30m`, `2h`; a bare number is minutes.
pub fn parse_duration(word: &str) -> Result<Duration, ParseError> {
    let bad = || ParseError::BadDuration(word.to_string());
    let (digits, unit) = match word.find(|c: char| !c.is_ascii_digit()) {
        Some(i) => word.split_at(i),
        None => (word, "m"),
    };
    let n: u64 = digits.parse().map_err(|_| bad())?;
    let secs = match unit {
        "s" => n,
        "m" => n.checked_mul(60).ok_or_else(bad)?,
        "h" => n.checked_mul(3600).ok_or_else(bad)?,
        _ => return Err(bad()),
    };
    Ok(Duration::from_secs(secs))
}

/// Run `request` against the coordinator and describe the result.
pub async fn execute(
    coordinator: &Arc<Coordinator>,
    config: &DaemonConfig,
    request: Request,
) -> String {
    let Request { actor, command } = request;
    let who = actor.handle.clone();

    match command {
        Command::Join => match coordinator.join(actor).await {
            Ok(position) => format!("{who} is keen (position {position})"),
            Err(e) => rejection(&who, &e),
        },
        Command::Leave => match coordinator.leave(actor.id).await {
            Ok(LeaveOutcome::Removed { cooldown_until, .. }) => format!(
                "{who} left the queue; leaving again is blocked for {}s",
                cooldown_until.saturating_duration_since(Instant::now()).as_secs()
            ),
            Ok(LeaveOutcome::GraceCancelled) => format!("{who} will not be put back in the queue"),
            Ok(LeaveOutcome::DeferredCancelled) => format!("{who}'s deferred join was cancelled"),
            Err(e) => rejection(&who, &e),
        },
        Command::Interest => match coordinator.toggle_interest(actor).await {
            Ok(true) => format!("{who} is potentially keen"),
            Ok(false) => format!("{who} is no longer potentially keen"),
            Err(e) => rejection(&who, &e),
        },
        Command::Queue => {
            let snapshot = coordinator.snapshot().await;
            let mut lines = vec![format!(
                "Queue {}/{}{}",
                snapshot.slots.len(),
                snapshot.capacity,
                if snapshot.round_active { " (ready check running)" } else { "" }
            )];
            for slot in &snapshot.slots {
                lines.push(format!("  {}. {}", slot.position, slot.participant));
            }
            if !snapshot.interested.is_empty() {
                let names: Vec<String> =
                    snapshot.interested.iter().map(|p| p.handle.clone()).collect();
                lines.push(format!("  potentially keen: {}", names.join(", ")));
            }
            lines.join("\n")
        }
        Command::Cooldown => {
            let remaining = coordinator.remaining_cooldown(actor.id).await;
            if remaining.is_zero() {
                format!("{who} has no cooldown")
            } else {
                format!("{who} is on cooldown for {}s", remaining.as_secs())
            }
        }
        Command::Spanners => {
            let counts = coordinator.violation_counts().await;
            if counts.is_empty() {
                return "No spanners yet".to_string();
            }
            counts
                .into_iter()
                .map(|(p, n)| format!("{}: {}", p.handle, n))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Command::Clear => {
            let authority = if config.is_admin(actor.id.as_u64()) {
                Authority::Privileged
            } else {
                Authority::Member
            };
            match coordinator.clear_violations(authority).await {
                Ok(count) => format!("Cleared {count} violations"),
                Err(e) => rejection(&who, &e),
            }
        }
        Command::Confirm(handle) => answer(&who, coordinator.confirm(&handle, actor.id).await),
        Command::Decline(handle) => answer(&who, coordinator.decline(&handle, actor.id).await),
        Command::Defer(delay) => match coordinator.schedule_deferred(actor, delay).await {
            Ok(_) => format!("{who} will be asked to join in {}s", delay.as_secs()),
            Err(e) => rejection(&who, &e),
        },
        Command::Undefer => match coordinator.cancel_deferred(actor.id).await {
            Ok(()) => format!("{who}'s deferred join was cancelled"),
            Err(e) => rejection(&who, &e),
        },
        Command::Help => HELP.to_string(),
    }
}

fn rejection(who: &str, err: &KeenError) -> String {
    match err {
        KeenError::AlreadyQueued(_) => format!("{who} is already in the queue"),
        KeenError::NotQueued(_) => format!("{who} is not in the queue"),
        KeenError::CapacityReached { capacity } => format!("The queue is full ({capacity})"),
        KeenError::OnCooldown { remaining, .. } => {
            format!("{who} must wait {}s before leaving again", remaining.as_secs())
        }
        other => format!("{who}: {other}"),
    }
}

fn answer(who: &str, outcome: ConfirmOutcome) -> String {
    match outcome {
        ConfirmOutcome::Accepted { remaining: 0 } => format!("{who} answered"),
        ConfirmOutcome::Accepted { remaining } => {
            format!("{who} is ready, waiting on {remaining} more")
        }
        ConfirmOutcome::Duplicate => format!("{who} already answered"),
        ConfirmOutcome::Ignored(IgnoreReason::UnknownHandle) => {
            "Nothing is waiting on that message".to_string()
        }
        ConfirmOutcome::Ignored(IgnoreReason::NotParticipant) => {
            format!("{who} is not being asked")
        }
        ConfirmOutcome::Ignored(IgnoreReason::DeclineNotSupported) => {
            "Ready checks only take confirmations".to_string()
        }
    }
}

const HELP: &str = "\
commands: join, leave, interest, queue, cooldown, spanners, clear,
          confirm <msg>, decline <msg>, defer <90s|30m|2h>, undefer";
