//! Postgres NOTIFY fan-out for out-of-process display screens.
//!
//! Events are sent on the `ticket_events` channel as JSON. Screens
//! connect a [`PgListener`] via [`listen`]. Postgres drops notifications
//! for listeners that are not connected, which matches the engine's
//! best-effort contract.

use sqlx::PgPool;
use sqlx::postgres::PgListener;

use super::Notifier;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::event::TicketEvent;

/// NOTIFY channel carrying [`TicketEvent`] payloads.
pub const CHANNEL: &str = "ticket_events";

/// Publishes events with `pg_notify`.
#[derive(Clone, Debug)]
pub struct PgNotifier {
    pool: PgPool,
}

impl PgNotifier {
    pub fn new(db: &Db) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

impl Notifier for PgNotifier {
    async fn publish(&self, event: &TicketEvent) -> Result<()> {
        let payload = serde_json::to_string(event)
            .map_err(|e| Error::Notify(format!("serialize event: {e}")))?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(CHANNEL)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Notify(format!("pg_notify: {e}")))?;
        Ok(())
    }
}

/// Open a listener subscribed to [`CHANNEL`].
pub async fn listen(db: &Db) -> Result<PgListener> {
    let mut listener = PgListener::connect_with(db.pool()).await?;
    listener.listen(CHANNEL).await?;
    Ok(listener)
}

/// Decode a notification payload back into an event.
pub fn decode(payload: &str) -> Result<TicketEvent> {
    serde_json::from_str(payload).map_err(|e| Error::Notify(format!("bad event payload: {e}")))
}
