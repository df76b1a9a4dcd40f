//! Pending-queue ordering.
//!
//! Every ticket carrying a priority label comes before every ticket
//! without one; inside each group, earliest arrival first. Labels are not
//! ranked against each other. A [`PendingQueue`] is a snapshot: iterate
//! it as often as needed, and ask the dispatcher for a new one to see
//! later changes.

use crate::model::{ServiceId, State, Ticket};

/// Which pending tickets to show.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum QueueScope {
    /// Everything the acting identity may see: all services, or the
    /// assigned ones for staff.
    #[default]
    Assigned,
    /// One service, still limited by the identity's assignments.
    Service(ServiceId),
}

/// Ordered view over pending tickets.
#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    /// Waiting tickets in arrival order.
    arrivals: Vec<Ticket>,
}

impl PendingQueue {
    /// Build a queue from arbitrary tickets. Anything not waiting is dropped.
    pub fn new(tickets: impl IntoIterator<Item = Ticket>) -> Self {
        let mut arrivals: Vec<Ticket> = tickets
            .into_iter()
            .filter(|t| t.state == State::Created)
            .collect();
        // Stable, so equal timestamps keep issue order.
        arrivals.sort_by(|a, b| {
            (a.created_at, a.issued_on, a.code.sequence())
                .cmp(&(b.created_at, b.issued_on, b.code.sequence()))
        });
        Self { arrivals }
    }

    /// Tickets in dispatch order. Lazy; restartable by calling again.
    pub fn iter(&self) -> impl Iterator<Item = &Ticket> + '_ {
        let priority = self.arrivals.iter().filter(|t| t.is_priority());
        let regular = self.arrivals.iter().filter(|t| !t.is_priority());
        priority.chain(regular)
    }

    /// The ticket that should be called next.
    pub fn head(&self) -> Option<&Ticket> {
        self.iter().next()
    }

    pub fn len(&self) -> usize {
        self.arrivals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrivals.is_empty()
    }

    /// Number of tickets that will be called before `ticket`.
    pub fn position(&self, ticket: crate::model::TicketId) -> Option<usize> {
        self.iter().position(|t| t.id == ticket)
    }

    /// Owned tickets in dispatch order.
    pub fn to_vec(&self) -> Vec<Ticket> {
        self.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for &'a PendingQueue {
    type Item = &'a Ticket;
    type IntoIter = Box<dyn Iterator<Item = &'a Ticket> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
