//! Event fan-out to displays and dashboards.
//!
//! Delivery is best-effort and at-most-once: nothing is persisted or
//! replayed, and a failed publish never fails the ticket operation that
//! produced it. The dispatcher logs and drops publish errors.

pub mod pg;

use std::future::Future;

use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::event::TicketEvent;

pub use pg::PgNotifier;

/// Outbound event sink.
pub trait Notifier: Send + Sync {
    /// Publish one event. Errors are reported but never retried.
    fn publish(&self, event: &TicketEvent) -> impl Future<Output = Result<()>> + Send;
}

/// In-process broadcast channel for embedded dashboards.
///
/// A bounded ring buffer shared by all receivers. Receivers that fall
/// behind observe `RecvError::Lagged(n)` and skip the `n` oldest events;
/// events sent while nobody is subscribed are lost.
#[derive(Clone, Debug)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<TicketEvent>,
}

impl BroadcastNotifier {
    /// Create a bus holding at most `capacity` undelivered events (min 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// A receiver observing events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TicketEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Notifier for BroadcastNotifier {
    async fn publish(&self, event: &TicketEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .map(|_| ())
            .map_err(|_| Error::Notify("no connected subscribers".to_string()))
    }
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    async fn publish(&self, _event: &TicketEvent) -> Result<()> {
        Ok(())
    }
}
