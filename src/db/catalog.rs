//! Services, the requester cache and the settings row.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::map_unique;
use crate::error::{Error, Result};
use crate::model::*;

pub(super) async fn get_service(pool: &PgPool, id: ServiceId) -> Result<Service> {
    let row: Option<ServiceRow> = sqlx::query_as(
        "SELECT id, name, prefix, active, created_at FROM services WHERE id = $1",
    )
    .bind(id.0)
    .fetch_optional(pool)
    .await?;
    row.map(Service::from)
        .ok_or_else(|| Error::NotFound(format!("service {id}")))
}

pub(super) async fn list_services(pool: &PgPool) -> Result<Vec<Service>> {
    let rows: Vec<ServiceRow> = sqlx::query_as(
        "SELECT id, name, prefix, active, created_at FROM services ORDER BY prefix",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Service::from).collect())
}

pub(super) async fn insert_service(pool: &PgPool, s: &Service) -> Result<()> {
    sqlx::query(
        "INSERT INTO services (id, name, prefix, active, created_at) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(s.id.0)
    .bind(&s.name)
    .bind(&s.prefix)
    .bind(s.active)
    .bind(s.created_at)
    .execute(pool)
    .await
    .map_err(|e| map_unique(e, |_| prefix_taken(s)))?;
    Ok(())
}

/// Replace a service row. The row is locked first so no ticket insert
/// (which takes a key-share lock through its foreign key) can slip in
/// between the ticket check and the prefix change.
pub(super) async fn update_service(pool: &PgPool, s: &Service) -> Result<()> {
    let mut tx = pool.begin().await?;

    let stored: Option<(String, String)> =
        sqlx::query_as("SELECT name, prefix FROM services WHERE id = $1 FOR UPDATE")
            .bind(s.id.0)
            .fetch_optional(&mut *tx)
            .await?;
    let Some((stored_name, stored_prefix)) = stored else {
        return Err(Error::NotFound(format!("service {}", s.id)));
    };

    if stored_prefix != s.prefix {
        let (has_tickets,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM tickets WHERE service_id = $1)")
                .bind(s.id.0)
                .fetch_one(&mut *tx)
                .await?;
        if has_tickets {
            return Err(Error::prefix_frozen(&stored_name));
        }
    }

    sqlx::query("UPDATE services SET name = $1, prefix = $2, active = $3 WHERE id = $4")
        .bind(&s.name)
        .bind(&s.prefix)
        .bind(s.active)
        .bind(s.id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, |_| prefix_taken(s)))?;

    tx.commit().await?;
    Ok(())
}

pub(super) async fn get_party(pool: &PgPool, document_number: &str) -> Result<Option<Party>> {
    let row: Option<PartyRow> = sqlx::query_as(
        "SELECT document_type, document_number, full_name, phone, email, category, updated_at
         FROM parties WHERE document_number = $1",
    )
    .bind(document_number)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Party::from))
}

/// Insert or refresh a cached requester. An older snapshot never
/// overwrites a newer one.
pub(super) async fn upsert_party(pool: &PgPool, p: &Party) -> Result<()> {
    let d = &p.details;
    sqlx::query(
        "INSERT INTO parties (document_number, document_type, full_name, phone, email, category, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (document_number) DO UPDATE
         SET document_type = EXCLUDED.document_type, full_name = EXCLUDED.full_name,
             phone = EXCLUDED.phone, email = EXCLUDED.email, category = EXCLUDED.category,
             updated_at = EXCLUDED.updated_at
         WHERE parties.updated_at <= EXCLUDED.updated_at",
    )
    .bind(&d.document_number)
    .bind(&d.document_type)
    .bind(&d.full_name)
    .bind(&d.phone)
    .bind(&d.email)
    .bind(&d.category)
    .bind(p.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Read the settings row, inserting the defaults if it does not exist yet.
pub(super) async fn get_settings(pool: &PgPool) -> Result<Settings> {
    let defaults = Settings::default();
    sqlx::query(
        "INSERT INTO settings (id, priority_labels, print_on_create) VALUES (1, $1, $2)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(&defaults.priority_labels)
    .bind(defaults.print_on_create)
    .execute(pool)
    .await?;

    let (priority_labels, print_on_create): (Vec<String>, bool) =
        sqlx::query_as("SELECT priority_labels, print_on_create FROM settings WHERE id = 1")
            .fetch_one(pool)
            .await?;
    Ok(Settings {
        priority_labels,
        print_on_create,
    })
}

pub(super) async fn put_settings(pool: &PgPool, s: &Settings) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (id, priority_labels, print_on_create) VALUES (1, $1, $2)
         ON CONFLICT (id) DO UPDATE
         SET priority_labels = EXCLUDED.priority_labels, print_on_create = EXCLUDED.print_on_create",
    )
    .bind(&s.priority_labels)
    .bind(s.print_on_create)
    .execute(pool)
    .await?;
    Ok(())
}

fn prefix_taken(s: &Service) -> Error {
    Error::duplicate(format!("prefix {} already in use", s.prefix))
}

#[derive(sqlx::FromRow)]
struct ServiceRow {
    id: Uuid,
    name: String,
    prefix: String,
    active: bool,
    created_at: DateTime<Utc>,
}

impl From<ServiceRow> for Service {
    fn from(row: ServiceRow) -> Self {
        Service {
            id: ServiceId(row.id),
            name: row.name,
            prefix: row.prefix,
            active: row.active,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PartyRow {
    document_type: String,
    document_number: String,
    full_name: String,
    phone: String,
    email: String,
    category: String,
    updated_at: DateTime<Utc>,
}

impl From<PartyRow> for Party {
    fn from(row: PartyRow) -> Self {
        Party {
            details: Requester {
                document_type: row.document_type,
                document_number: row.document_number,
                full_name: row.full_name,
                phone: row.phone,
                email: row.email,
                category: row.category,
            },
            updated_at: row.updated_at,
        }
    }
}
