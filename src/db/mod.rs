//! Postgres connection pool, migrations, and the [`TicketStore`] adapter.
//!
//! Codes are protected by a unique index on (service, day, sequence) and a
//! counter row per (service, day) bumped with a single upsert. Ticket
//! updates are conditional on state and revision.

mod catalog;
mod tickets;

use chrono::NaiveDate;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::{Error, Result};
use crate::model::*;
use crate::store::{TicketFilter, TicketStore};

/// Database handle. Owns the connection pool.
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Turn a unique violation into a conflict built from the constraint name.
/// Other errors pass through.
fn map_unique(e: sqlx::Error, conflict: impl FnOnce(Option<&str>) -> Error) -> Error {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return conflict(db.constraint());
        }
    }
    Error::Database(e)
}

impl TicketStore for Db {
    async fn get_ticket(&self, id: TicketId) -> Result<Ticket> {
        tickets::get(&self.pool, id).await
    }

    async fn create_ticket(&self, ticket: &Ticket) -> Result<()> {
        tickets::insert(&self.pool, ticket).await
    }

    async fn update_ticket(&self, ticket: &Ticket, from: State) -> Result<()> {
        tickets::update(&self.pool, ticket, from).await
    }

    async fn next_sequence(&self, service: ServiceId, day: NaiveDate) -> Result<u32> {
        tickets::next_sequence(&self.pool, service, day).await
    }

    async fn find_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>> {
        tickets::find(&self.pool, filter).await
    }

    async fn get_service(&self, id: ServiceId) -> Result<Service> {
        catalog::get_service(&self.pool, id).await
    }

    async fn list_services(&self) -> Result<Vec<Service>> {
        catalog::list_services(&self.pool).await
    }

    async fn insert_service(&self, service: &Service) -> Result<()> {
        catalog::insert_service(&self.pool, service).await
    }

    async fn update_service(&self, service: &Service) -> Result<()> {
        catalog::update_service(&self.pool, service).await
    }

    async fn get_party(&self, document_number: &str) -> Result<Option<Party>> {
        catalog::get_party(&self.pool, document_number).await
    }

    async fn upsert_party(&self, party: &Party) -> Result<()> {
        catalog::upsert_party(&self.pool, party).await
    }

    async fn get_settings(&self) -> Result<Settings> {
        catalog::get_settings(&self.pool).await
    }

    async fn put_settings(&self, settings: &Settings) -> Result<()> {
        catalog::put_settings(&self.pool, settings).await
    }
}
