//! Metric instrument factories for counterq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a provider (tests, local dev) every instrument is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("counterq")
}

/// Counter: tickets issued.
/// Labels: `service` (prefix), `priority` ("yes" | "no").
pub fn tickets_created() -> Counter<u64> {
    meter()
        .u64_counter("counterq.tickets.created")
        .with_description("Number of tickets issued")
        .build()
}

/// Counter: ticket state transitions.
/// Labels: `operation`, `from`, `to`.
pub fn ticket_transitions() -> Counter<u64> {
    meter()
        .u64_counter("counterq.tickets.transitions")
        .with_description("Number of ticket state transitions")
        .build()
}

/// Counter: operations rejected by a guard or a lost race.
/// Labels: `operation`, `reason` ("invalid_transition" | "forbidden" | "conflict" | ...).
pub fn operations_rejected() -> Counter<u64> {
    meter()
        .u64_counter("counterq.operations.rejected")
        .with_description("Number of dispatcher operations that failed")
        .build()
}

/// Counter: code writes that collided and were retried.
/// Labels: `service`.
pub fn sequence_conflicts() -> Counter<u64> {
    meter()
        .u64_counter("counterq.sequence.conflicts")
        .with_description("Number of code allocations retried after a collision")
        .build()
}

/// Counter: events that could not be delivered.
/// Labels: `kind`.
pub fn notifications_dropped() -> Counter<u64> {
    meter()
        .u64_counter("counterq.notifications.dropped")
        .with_description("Number of lifecycle events dropped by the notifier")
        .build()
}

/// Histogram: seconds between issue and call.
/// Labels: `service`.
pub fn wait_seconds() -> Histogram<f64> {
    meter()
        .f64_histogram("counterq.tickets.wait_seconds")
        .with_description("Time a ticket waited before being called")
        .with_unit("s")
        .build()
}

/// Histogram: seconds spent serving a ticket.
/// Labels: `service`.
pub fn service_seconds() -> Histogram<f64> {
    meter()
        .f64_histogram("counterq.tickets.service_seconds")
        .with_description("Time spent serving a ticket")
        .with_unit("s")
        .build()
}
