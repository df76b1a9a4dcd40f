//! Storage interface consumed by the dispatcher.
//!
//! The dispatcher never talks to a database directly. Adapters implement
//! [`TicketStore`]: [`MemoryStore`] for tests and embedded use, and
//! [`crate::db::Db`] for Postgres.
//!
//! Two operations carry the engine's concurrency guarantees:
//! - [`TicketStore::next_sequence`] is an atomic per-(service, day) counter.
//! - [`TicketStore::update_ticket`] is a conditional write that fails with
//!   [`Error::Conflict`](crate::error::Error::Conflict) if the ticket moved on.

pub mod memory;

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::model::*;

pub use memory::MemoryStore;

/// Ticket, service, party and settings persistence.
pub trait TicketStore: Send + Sync {
    /// Fetch a ticket. `NotFound` if unknown.
    fn get_ticket(&self, id: TicketId) -> impl Future<Output = Result<Ticket>> + Send;

    /// Insert a new ticket. `Conflict` if its code is already taken for
    /// (service, `issued_on`).
    fn create_ticket(&self, ticket: &Ticket) -> impl Future<Output = Result<()>> + Send;

    /// Replace a ticket, provided the stored copy is still in state `from`
    /// at revision `ticket.revision - 1`. `Conflict` otherwise, or when the
    /// new code collides. `NotFound` if the ticket does not exist.
    fn update_ticket(&self, ticket: &Ticket, from: State)
    -> impl Future<Output = Result<()>> + Send;

    /// Atomically allocate the next sequence number for (service, day).
    ///
    /// Never below `max(existing sequence) + 1` for that service and day.
    fn next_sequence(
        &self,
        service: ServiceId,
        day: NaiveDate,
    ) -> impl Future<Output = Result<u32>> + Send;

    /// Tickets matching `filter`, in the filter's [`TicketOrder`] and cut to
    /// its limit.
    fn find_tickets(&self, filter: &TicketFilter)
    -> impl Future<Output = Result<Vec<Ticket>>> + Send;

    /// Fetch a service. `NotFound` if unknown.
    fn get_service(&self, id: ServiceId) -> impl Future<Output = Result<Service>> + Send;

    /// All services, ordered by prefix.
    fn list_services(&self) -> impl Future<Output = Result<Vec<Service>>> + Send;

    /// Insert a service. `Conflict` if the prefix is taken.
    fn insert_service(&self, service: &Service) -> impl Future<Output = Result<()>> + Send;

    /// Replace a service. `Conflict` if the new prefix is taken,
    /// `Validation` if the prefix changes while tickets reference the
    /// service. The ticket check and the write are one atomic step.
    fn update_service(&self, service: &Service) -> impl Future<Output = Result<()>> + Send;

    fn get_party(
        &self,
        document_number: &str,
    ) -> impl Future<Output = Result<Option<Party>>> + Send;

    fn upsert_party(&self, party: &Party) -> impl Future<Output = Result<()>> + Send;

    /// Current settings, inserting the defaults on first read.
    fn get_settings(&self) -> impl Future<Output = Result<Settings>> + Send;

    fn put_settings(&self, settings: &Settings) -> impl Future<Output = Result<()>> + Send;
}

/// Selection criteria for [`TicketStore::find_tickets`]. Empty matches all.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    /// Empty means any state.
    pub states: Vec<State>,
    pub service_ids: Option<Vec<ServiceId>>,
    pub staff_id: Option<String>,
    pub priority: Option<String>,
    pub document_number: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub created_before: Option<DateTime<Utc>>,
    pub order: TicketOrder,
    /// At most this many tickets, applied after ordering.
    pub limit: Option<usize>,
}

/// Result order for [`TicketStore::find_tickets`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TicketOrder {
    /// Oldest `created_at` first, ties broken by day and sequence.
    #[default]
    Arrival,
    /// Newest `called_at` first. Tickets never called sort last.
    RecentlyCalled,
}

impl TicketFilter {
    pub fn in_states(states: impl IntoIterator<Item = State>) -> Self {
        Self {
            states: states.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn services(mut self, ids: impl IntoIterator<Item = ServiceId>) -> Self {
        self.service_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn created_between(mut self, from: DateTime<Utc>, before: DateTime<Utc>) -> Self {
        self.created_from = Some(from);
        self.created_before = Some(before);
        self
    }

    pub fn recently_called_first(mut self) -> Self {
        self.order = TicketOrder::RecentlyCalled;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sort `tickets` into this filter's order and apply the limit.
    pub fn arrange(&self, tickets: &mut Vec<Ticket>) {
        match self.order {
            TicketOrder::Arrival => tickets.sort_by(|a, b| {
                (a.created_at, a.issued_on, a.code.sequence())
                    .cmp(&(b.created_at, b.issued_on, b.code.sequence()))
            }),
            TicketOrder::RecentlyCalled => tickets.sort_by(|a, b| {
                match (a.called_at, b.called_at) {
                    (Some(x), Some(y)) => y.cmp(&x),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                }
                .then_with(|| a.created_at.cmp(&b.created_at))
            }),
        }
        if let Some(limit) = self.limit {
            tickets.truncate(limit);
        }
    }

    /// Whether `ticket` satisfies every criterion.
    pub fn matches(&self, ticket: &Ticket) -> bool {
        (self.states.is_empty() || self.states.contains(&ticket.state))
            && self
                .service_ids
                .as_ref()
                .is_none_or(|ids| ids.contains(&ticket.service_id))
            && self
                .staff_id
                .as_ref()
                .is_none_or(|id| ticket.staff_id.as_ref() == Some(id))
            && self
                .priority
                .as_ref()
                .is_none_or(|p| ticket.priority.as_ref() == Some(p))
            && self
                .document_number
                .as_ref()
                .is_none_or(|d| &ticket.requester.document_number == d)
            && self.created_from.is_none_or(|from| ticket.created_at >= from)
            && self
                .created_before
                .is_none_or(|before| ticket.created_at < before)
    }
}
