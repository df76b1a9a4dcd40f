//! Lifecycle events published after every successful ticket change.
//!
//! Displays and dashboards subscribe to these to stay in sync. Each event
//! carries the whole post-transition ticket so consumers never need a
//! follow-up read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Operation, Ticket};

/// A ticket lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketEvent {
    /// What happened.
    pub kind: EventKind,
    /// When it was published.
    pub timestamp: DateTime<Utc>,
    /// The ticket as persisted by the transition.
    pub ticket: Ticket,
}

impl TicketEvent {
    pub fn new(kind: EventKind, ticket: Ticket) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            ticket,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Called,
    Serving,
    Closed,
    Canceled,
    Redirected,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Called => "called",
            EventKind::Serving => "serving",
            EventKind::Closed => "closed",
            EventKind::Canceled => "canceled",
            EventKind::Redirected => "redirected",
        }
    }
}

impl From<Operation> for EventKind {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Create => EventKind::Created,
            Operation::Call => EventKind::Called,
            Operation::Attend => EventKind::Serving,
            Operation::Close => EventKind::Closed,
            Operation::Cancel => EventKind::Canceled,
            Operation::Redirect => EventKind::Redirected,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
