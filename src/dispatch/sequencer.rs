//! Per-service, per-day display code allocation.
//!
//! Sequence numbers come from the store's atomic counter, never from a
//! read-max-then-write. If the write that consumes a code still collides
//! (for instance with rows imported behind the counter's back), the
//! sequencer allocates again, up to `max_attempts` times.

use std::future::Future;

use chrono::NaiveDate;
use opentelemetry::KeyValue;
use tracing::warn;

use crate::error::{ConflictKind, Error, Result};
use crate::model::{Service, TicketCode};
use crate::store::TicketStore;
use crate::telemetry::metrics;

#[derive(Debug, Clone, Copy)]
pub struct Sequencer {
    max_attempts: u32,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new(5)
    }
}

impl Sequencer {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// The next code for `service` on `day`.
    pub async fn next_code<S: TicketStore>(
        &self,
        store: &S,
        service: &Service,
        day: NaiveDate,
    ) -> Result<TicketCode> {
        let sequence = store.next_sequence(service.id, day).await?;
        Ok(TicketCode::new(service.prefix.clone(), sequence))
    }

    /// Allocate a code and hand it to `write`, retrying when the write
    /// reports the code as taken. Other conflicts surface immediately.
    ///
    /// Each retry draws a fresh, larger code; a burned code is never reused.
    pub async fn issue<S, T, F, Fut>(
        &self,
        store: &S,
        service: &Service,
        day: NaiveDate,
        mut write: F,
    ) -> Result<T>
    where
        S: TicketStore,
        F: FnMut(TicketCode) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let code = self.next_code(store, service, day).await?;
            match write(code.clone()).await {
                Err(Error::Conflict {
                    kind: ConflictKind::Code,
                    detail,
                }) if attempt < self.max_attempts => {
                    warn!(
                        service = %service.prefix,
                        %code,
                        attempt,
                        %detail,
                        "code collision, allocating again"
                    );
                    metrics::sequence_conflicts()
                        .add(1, &[KeyValue::new("service", service.prefix.clone())]);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
