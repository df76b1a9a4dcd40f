//! Ticket records, lifecycle states and display codes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::service::ServiceId;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Ticket
// ---------------------------------------------------------------------------

/// A client's request for a service, from issue to resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,

    /// Display code, e.g. `A-007`. Unique within (service, `issued_on`).
    pub code: TicketCode,

    /// Service day the code was issued on. Redirect reissues it.
    pub issued_on: NaiveDate,

    pub service_id: ServiceId,

    /// Service name as it was when the ticket joined the service's queue.
    /// Later renames do not rewrite history.
    pub service_name: String,

    /// Priority label. Any label moves the ticket ahead of unlabeled ones.
    pub priority: Option<String>,

    pub notes: Option<String>,

    pub state: State,

    /// Staff member who called (or, for cancellations, canceled) the ticket.
    pub staff_id: Option<String>,
    pub staff_name: Option<String>,

    /// Physical desk where the ticket is being served.
    pub desk: Option<String>,

    pub created_at: DateTime<Utc>,
    pub called_at: Option<DateTime<Utc>>,
    pub attended_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,

    /// Seconds between creation and call.
    pub wait_seconds: Option<i64>,

    /// Seconds between attend (or call, when attend was skipped) and close.
    pub service_seconds: Option<i64>,

    /// Who asked for the ticket, frozen at creation.
    pub requester: Requester,

    /// Bumped on every write. Stores reject writes based on a stale revision.
    pub revision: u32,
}

impl Ticket {
    /// True when the ticket carries a non-empty priority label.
    pub fn is_priority(&self) -> bool {
        self.priority.as_deref().is_some_and(|p| !p.trim().is_empty())
    }
}

/// Newtype for ticket IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TicketId(pub Uuid);

impl TicketId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TicketId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::Validation(format!("bad ticket id {s:?}: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Code
// ---------------------------------------------------------------------------

/// Display code `<PREFIX>-<NNN>`.
///
/// The sequence is zero-padded to three digits and widens past 999
/// (`A-1000`) rather than wrapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TicketCode {
    prefix: String,
    sequence: u32,
}

impl TicketCode {
    pub fn new(prefix: impl Into<String>, sequence: u32) -> Self {
        Self {
            prefix: prefix.into(),
            sequence,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl std::fmt::Display for TicketCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:03}", self.prefix, self.sequence)
    }
}

impl std::str::FromStr for TicketCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (prefix, number) = s
            .rsplit_once('-')
            .ok_or_else(|| Error::Validation(format!("bad ticket code {s:?}")))?;
        if prefix.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Validation(format!("bad ticket code {s:?}")));
        }
        let sequence = number
            .parse()
            .map_err(|e| Error::Validation(format!("bad ticket code {s:?}: {e}")))?;
        Ok(Self::new(prefix, sequence))
    }
}

impl TryFrom<String> for TicketCode {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<TicketCode> for String {
    fn from(code: TicketCode) -> Self {
        code.to_string()
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Waiting in the service queue.
    Created,
    /// Called to a desk.
    Called,
    /// Being served at the desk.
    Serving,
    /// Served. Terminal.
    Closed,
    /// Withdrawn by an administrator before being called. Terminal.
    Canceled,
}

impl State {
    pub const ALL: [State; 5] = [
        State::Created,
        State::Called,
        State::Serving,
        State::Closed,
        State::Canceled,
    ];

    /// Can transition from self to `to`?
    ///
    /// `Called|Serving -> Created` is only reachable through redirect.
    pub fn can_transition_to(self, to: State) -> bool {
        use State::*;
        matches!(
            (self, to),
            (Created, Called)
                | (Created, Canceled)
                | (Created, Created)    // redirect while waiting
                | (Called, Serving)
                | (Called, Closed)      // closed without an explicit attend
                | (Called, Created)     // redirect
                | (Serving, Closed)
                | (Serving, Created) // redirect
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Closed | State::Canceled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Created => "created",
            State::Called => "called",
            State::Serving => "serving",
            State::Closed => "closed",
            State::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for State {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        State::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown ticket state {s:?}")))
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// Client-facing operations on a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Call,
    Attend,
    Close,
    Cancel,
    Redirect,
}

impl Operation {
    /// State the ticket is left in when the operation succeeds.
    pub fn target(self) -> State {
        match self {
            Operation::Create | Operation::Redirect => State::Created,
            Operation::Call => State::Called,
            Operation::Attend => State::Serving,
            Operation::Close => State::Closed,
            Operation::Cancel => State::Canceled,
        }
    }

    /// Whether the operation may be applied to a ticket in `from`.
    pub fn allowed_from(self, from: State) -> bool {
        match self {
            Operation::Create => false,
            Operation::Call => from == State::Created,
            Operation::Attend => from == State::Called,
            Operation::Close => matches!(from, State::Called | State::Serving),
            Operation::Cancel => from == State::Created,
            Operation::Redirect => !from.is_terminal(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Call => "call",
            Operation::Attend => "attend",
            Operation::Close => "close",
            Operation::Cancel => "cancel",
            Operation::Redirect => "redirect",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Requester
// ---------------------------------------------------------------------------

/// Identity fields of the person the ticket was issued to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Requester {
    pub document_type: String,
    pub document_number: String,
    pub full_name: String,
    pub phone: String,
    pub email: String,
    /// Requester category, e.g. "student" or "visitor".
    pub category: String,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a ticket request. The dispatcher's public API for issuing tickets.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub(crate) service_id: ServiceId,
    pub(crate) priority: Option<String>,
    pub(crate) notes: Option<String>,
    pub(crate) requester: Requester,
}

impl NewTicket {
    pub fn new(service_id: ServiceId, requester: Requester) -> Self {
        Self {
            service_id,
            priority: None,
            notes: None,
            requester,
        }
    }

    pub fn priority(mut self, label: impl Into<String>) -> Self {
        self.priority = Some(label.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn service_id(&self) -> ServiceId {
        self.service_id
    }
}
