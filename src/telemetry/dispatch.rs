//! Dispatcher span helpers.

use tracing::Span;

use crate::model::{Identity, Operation};

/// Start a span for one dispatcher operation.
///
/// `ticket.id` and `ticket.code` are declared empty; fill them with
/// [`record_ticket`] once known (creation only learns them late).
pub fn start_operation_span(op: Operation, actor: &Identity) -> Span {
    tracing::info_span!(
        "dispatch",
        "dispatch.operation" = op.as_str(),
        "actor.id" = %actor.id,
        "actor.role" = actor.role.as_str(),
        "ticket.id" = tracing::field::Empty,
        "ticket.code" = tracing::field::Empty,
    )
}

/// Attach the ticket identity to an operation span.
pub fn record_ticket(span: &Span, id: &impl std::fmt::Display, code: &impl std::fmt::Display) {
    span.record("ticket.id", tracing::field::display(id));
    span.record("ticket.code", tracing::field::display(code));
}

/// Emit a state transition event scoped to the given span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
