//! Attention report: tickets over a day range with state totals and
//! average wait and service times.

use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::Dispatcher;
use crate::error::{Error, Result};
use crate::model::*;
use crate::notify::Notifier;
use crate::store::{TicketFilter, TicketStore};

/// Report criteria. Day bounds are inclusive service days; missing bounds
/// leave that side open.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub service_id: Option<ServiceId>,
    pub staff_id: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub created: usize,
    pub called: usize,
    pub serving: usize,
    pub closed: usize,
    pub canceled: usize,
}

impl StateCounts {
    fn bump(&mut self, state: State) {
        match state {
            State::Created => self.created += 1,
            State::Called => self.called += 1,
            State::Serving => self.serving += 1,
            State::Closed => self.closed += 1,
            State::Canceled => self.canceled += 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub total: usize,
    pub by_state: StateCounts,
    /// Mean over tickets that were called. `None` if there are none.
    pub avg_wait_seconds: Option<f64>,
    /// Mean over closed tickets that have a service time.
    pub avg_service_seconds: Option<f64>,
    pub tickets: Vec<Ticket>,
}

impl Report {
    /// Summarize `tickets`, kept in the given order.
    pub fn summarize(tickets: Vec<Ticket>) -> Self {
        let mut by_state = StateCounts::default();
        for ticket in &tickets {
            by_state.bump(ticket.state);
        }
        Self {
            total: tickets.len(),
            by_state,
            avg_wait_seconds: mean(tickets.iter().filter_map(|t| t.wait_seconds)),
            avg_service_seconds: mean(tickets.iter().filter_map(|t| t.service_seconds)),
            tickets,
        }
    }
}

fn mean(values: impl Iterator<Item = i64>) -> Option<f64> {
    let (sum, n) = values.fold((0i64, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum as f64 / n as f64)
}

impl<S: TicketStore, N: Notifier> Dispatcher<S, N> {
    /// Build a report. Admins and staff only.
    pub async fn report(&self, actor: &Identity, filter: ReportFilter) -> Result<Report> {
        if !matches!(actor.role, Role::Admin | Role::Staff) {
            return Err(Error::Forbidden(format!(
                "role {} may not read reports",
                actor.role
            )));
        }
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(Error::Validation(format!(
                    "report range starts after it ends: {from} > {to}"
                )));
            }
        }

        let created_from = filter.from.map(|day| self.config.day_start(day));
        let created_before = filter
            .to
            .and_then(|day| day.checked_add_days(Days::new(1)))
            .map(|day| self.config.day_start(day));
        let query = TicketFilter {
            service_ids: filter.service_id.map(|id| vec![id]),
            staff_id: filter.staff_id,
            priority: filter.priority.filter(|p| !p.trim().is_empty()),
            created_from,
            created_before,
            ..TicketFilter::default()
        };
        let tickets = self.bounded(self.store.find_tickets(&query)).await?;
        tracing::debug!(count = tickets.len(), generated_at = %Utc::now(), "report built");
        Ok(Report::summarize(tickets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_nothing_is_none() {
        assert_eq!(mean(std::iter::empty()), None);
        assert_eq!(mean([10, 20, 40].into_iter()), Some(70.0 / 3.0));
    }
}
