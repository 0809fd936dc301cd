use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle states of a forwarding activity.
///
/// An activity advances along a DAG: submission creates it, the send worker
/// leases it and calls the target, reply delivery forwards the persisted
/// response, and cleanup eventually removes it. The only reverse edge is the
/// requeue of failed sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityState {
    /// Persisted at submit, not yet picked up.
    Created,
    /// Leased by a send worker (or requeued after a failed send).
    Scheduled,
    /// Target call succeeded and its response is persisted.
    Sent,
    /// Target call failed; eligible for requeue.
    SentFailed,
    /// Reply delivery failed; eligible for reply retry.
    ReplyFailed,
    /// Response delivered to the reply URL.
    Completed,
}

impl ActivityState {
    /// Terminal before garbage collection; no worker touches it again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Failure states that a periodic worker will pick back up.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::SentFailed | Self::ReplyFailed)
    }

    /// Legal transition table.
    ///
    /// `Scheduled -> Scheduled` covers a re-lease of an already scheduled
    /// row, and `ReplyFailed -> ReplyFailed` a reply retry that failed again.
    pub fn can_transition_to(&self, next: ActivityState) -> bool {
        use ActivityState::*;
        matches!(
            (*self, next),
            (Created, Scheduled)
                | (Scheduled, Scheduled)
                | (Scheduled, Sent)
                | (Scheduled, SentFailed)
                | (SentFailed, Scheduled)
                | (Sent, Completed)
                | (Sent, ReplyFailed)
                | (ReplyFailed, ReplyFailed)
                | (ReplyFailed, Completed)
        )
    }
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Scheduled => write!(f, "SCHEDULED"),
            Self::Sent => write!(f, "SENT"),
            Self::SentFailed => write!(f, "SENT_FAILED"),
            Self::ReplyFailed => write!(f, "REPLY_FAILED"),
            Self::Completed => write!(f, "COMPLETED"),
        }
    }
}

impl std::str::FromStr for ActivityState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "SCHEDULED" => Ok(Self::Scheduled),
            "SENT" => Ok(Self::Sent),
            "SENT_FAILED" => Ok(Self::SentFailed),
            "REPLY_FAILED" => Ok(Self::ReplyFailed),
            "COMPLETED" => Ok(Self::Completed),
            _ => Err(format!("Invalid activity state: {s}")),
        }
    }
}
