//! Ticket lifecycle: guards and transitions.
//!
//! Every function here is pure. It takes the current ticket and returns
//! the next one, or the reason the operation is not allowed. Persisting
//! the result is the dispatcher's job.
//!
//! ```text
//! created ──call──► called ──attend──► serving ──close──► closed
//!    │                 └──────────close───────────────────►
//!    └──cancel──► canceled
//! created|called|serving ──redirect──► created (new service, new code)
//! ```

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Error, Result};
use crate::model::*;

/// Whether `role` may perform `op` at all.
pub fn permits(op: Operation, role: Role) -> bool {
    use Operation::*;
    use Role::*;
    match (op, role) {
        (Create, Admin | Staff | FrontDesk) => true,
        (Call | Attend | Redirect, Admin | Staff) => true,
        (Call | Attend | Redirect, FrontDesk) => false,
        (Close, Admin | Staff | FrontDesk) => true,
        (Cancel, Admin) => true,
        (Cancel, Staff | FrontDesk) => false,
    }
}

/// Check role, assignment and state guards for `op` on `ticket`.
pub fn ensure(op: Operation, actor: &Identity, ticket: &Ticket) -> Result<()> {
    if !permits(op, actor.role) {
        return Err(Error::Forbidden(format!(
            "role {} may not {op} tickets",
            actor.role
        )));
    }
    if op == Operation::Call && !actor.covers(ticket.service_id) {
        return Err(Error::Forbidden(format!(
            "{} is not assigned to service {}",
            actor.id, ticket.service_name
        )));
    }
    if !op.allowed_from(ticket.state) {
        return Err(Error::InvalidTransition {
            from: ticket.state,
            op,
        });
    }
    debug_assert!(ticket.state.can_transition_to(op.target()));
    Ok(())
}

/// Guards for issuing a ticket against `service`.
pub fn ensure_create(actor: &Identity, service: &Service) -> Result<()> {
    if !permits(Operation::Create, actor.role) {
        return Err(Error::Forbidden(format!(
            "role {} may not create tickets",
            actor.role
        )));
    }
    ensure_open(service)
}

/// Only active services accept new or redirected tickets.
pub fn ensure_open(service: &Service) -> Result<()> {
    if service.active {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "service {} is not active",
            service.name
        )))
    }
}

/// Build a fresh ticket. The request must already be validated.
pub fn issue(
    request: NewTicket,
    service: &Service,
    code: TicketCode,
    issued_on: NaiveDate,
    now: DateTime<Utc>,
) -> Ticket {
    Ticket {
        id: TicketId::new(),
        code,
        issued_on,
        service_id: service.id,
        service_name: service.name.clone(),
        priority: request.priority,
        notes: request.notes,
        state: State::Created,
        staff_id: None,
        staff_name: None,
        desk: None,
        created_at: now,
        called_at: None,
        attended_at: None,
        closed_at: None,
        wait_seconds: None,
        service_seconds: None,
        requester: request.requester,
        revision: 0,
    }
}

/// created → called. Assigns the caller and their desk.
pub fn call(
    ticket: &Ticket,
    actor: &Identity,
    desk: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Ticket> {
    ensure(Operation::Call, actor, ticket)?;
    Ok(Ticket {
        state: State::Called,
        staff_id: Some(actor.id.clone()),
        staff_name: Some(actor.display_name.clone()),
        desk: Some(resolve_desk(actor, desk)),
        called_at: Some(now),
        wait_seconds: Some(seconds_between(ticket.created_at, now)),
        revision: ticket.revision + 1,
        ..ticket.clone()
    })
}

/// called → serving.
pub fn attend(ticket: &Ticket, actor: &Identity, now: DateTime<Utc>) -> Result<Ticket> {
    ensure(Operation::Attend, actor, ticket)?;
    Ok(Ticket {
        state: State::Serving,
        attended_at: Some(now),
        revision: ticket.revision + 1,
        ..ticket.clone()
    })
}

/// called|serving → closed. Service time runs from attend, else from call.
pub fn close(ticket: &Ticket, actor: &Identity, now: DateTime<Utc>) -> Result<Ticket> {
    ensure(Operation::Close, actor, ticket)?;
    let started = ticket.attended_at.or(ticket.called_at);
    Ok(Ticket {
        state: State::Closed,
        closed_at: Some(now),
        service_seconds: started.map(|at| seconds_between(at, now)),
        revision: ticket.revision + 1,
        ..ticket.clone()
    })
}

/// created → canceled. The staff fields record who canceled it.
pub fn cancel(ticket: &Ticket, actor: &Identity, now: DateTime<Utc>) -> Result<Ticket> {
    ensure(Operation::Cancel, actor, ticket)?;
    Ok(Ticket {
        state: State::Canceled,
        closed_at: Some(now),
        staff_id: Some(actor.id.clone()),
        staff_name: Some(format!("Canceled by: {}", actor.display_name)),
        revision: ticket.revision + 1,
        ..ticket.clone()
    })
}

/// Any non-terminal state → created under `destination` with a new code.
///
/// Creation time is kept, so the ticket slots into the destination queue
/// by its original arrival.
pub fn redirect(
    ticket: &Ticket,
    actor: &Identity,
    destination: &Service,
    code: TicketCode,
    issued_on: NaiveDate,
) -> Result<Ticket> {
    ensure(Operation::Redirect, actor, ticket)?;
    ensure_open(destination)?;
    Ok(Ticket {
        code,
        issued_on,
        service_id: destination.id,
        service_name: destination.name.clone(),
        state: State::Created,
        staff_id: None,
        staff_name: None,
        desk: None,
        called_at: None,
        attended_at: None,
        wait_seconds: None,
        revision: ticket.revision + 1,
        ..ticket.clone()
    })
}

/// Desk precedence: the caller's fixed desk, the requested one, then one
/// named after the caller.
fn resolve_desk(actor: &Identity, requested: Option<&str>) -> String {
    let fixed = actor.desk.as_deref().map(str::trim).filter(|d| !d.is_empty());
    let requested = requested.map(str::trim).filter(|d| !d.is_empty());
    match fixed.or(requested) {
        Some(desk) => desk.to_string(),
        None => {
            let first = actor
                .display_name
                .split_whitespace()
                .next()
                .unwrap_or(actor.id.as_str());
            format!("Desk {first}")
        }
    }
}

/// Whole seconds from `from` to `to`, never negative.
fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_desk_wins_over_requested() {
        let actor = Identity::new("s1", "Ana Ruiz", Role::Staff).at_desk("Desk 4");
        assert_eq!(resolve_desk(&actor, Some("Desk 9")), "Desk 4");
    }

    #[test]
    fn desk_falls_back_to_first_name() {
        let actor = Identity::new("s1", "Ana Ruiz", Role::Staff);
        assert_eq!(resolve_desk(&actor, Some("  ")), "Desk Ana");
        assert_eq!(resolve_desk(&actor, Some("Window 2")), "Window 2");
    }

    #[test]
    fn clock_skew_never_yields_negative_durations() {
        let now = Utc::now();
        assert_eq!(seconds_between(now, now - chrono::Duration::seconds(5)), 0);
        assert_eq!(seconds_between(now, now + chrono::Duration::seconds(5)), 5);
    }

    #[test]
    fn every_allowed_operation_is_a_legal_state_edge() {
        let ops = [
            Operation::Call,
            Operation::Attend,
            Operation::Close,
            Operation::Cancel,
            Operation::Redirect,
        ];
        for from in State::ALL {
            for op in ops {
                if op.allowed_from(from) {
                    assert!(
                        from.can_transition_to(op.target()),
                        "{op} allowed from {from} but {from} -> {} is not an edge",
                        op.target()
                    );
                }
            }
        }
    }
}
