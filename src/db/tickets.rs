//! Ticket rows: insert, conditional update, filtered reads, code counters.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::map_unique;
use crate::error::{Error, Result};
use crate::model::*;
use crate::store::{TicketFilter, TicketOrder};

const COLUMNS: &str = "id, prefix, sequence, issued_on, service_id, service_name, priority, notes, state, \
     staff_id, staff_name, desk, created_at, called_at, attended_at, closed_at, wait_seconds, \
     service_seconds, document_type, document_number, full_name, phone, email, category, revision";

pub(super) async fn get(pool: &PgPool, id: TicketId) -> Result<Ticket> {
    let row: Option<TicketRow> =
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM tickets WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(pool)
            .await?;
    row.ok_or_else(|| Error::NotFound(format!("ticket {id}")))?
        .try_into_ticket()
}

pub(super) async fn insert(pool: &PgPool, t: &Ticket) -> Result<()> {
    let mut tx = pool.begin().await?;
    ensure_not_retired(&mut *tx, t).await?;
    sqlx::query(
        "INSERT INTO tickets (id, prefix, sequence, issued_on, service_id, service_name, priority, notes, state,
                              staff_id, staff_name, desk, created_at, called_at, attended_at, closed_at,
                              wait_seconds, service_seconds, document_type, document_number, full_name,
                              phone, email, category, revision)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19,
                 $20, $21, $22, $23, $24, $25)",
    )
    .bind(t.id.0)
    .bind(t.code.prefix())
    .bind(t.code.sequence() as i32)
    .bind(t.issued_on)
    .bind(t.service_id.0)
    .bind(&t.service_name)
    .bind(&t.priority)
    .bind(&t.notes)
    .bind(t.state.as_str())
    .bind(&t.staff_id)
    .bind(&t.staff_name)
    .bind(&t.desk)
    .bind(t.created_at)
    .bind(t.called_at)
    .bind(t.attended_at)
    .bind(t.closed_at)
    .bind(t.wait_seconds)
    .bind(t.service_seconds)
    .bind(&t.requester.document_type)
    .bind(&t.requester.document_number)
    .bind(&t.requester.full_name)
    .bind(&t.requester.phone)
    .bind(&t.requester.email)
    .bind(&t.requester.category)
    .bind(t.revision as i32)
    .execute(&mut *tx)
    .await
    .map_err(|e| map_unique(e, |constraint| code_or_duplicate(constraint, t)))?;
    tx.commit().await?;
    Ok(())
}

/// Optimistic write: only lands if the row is still in `from` at the
/// previous revision.
pub(super) async fn update(pool: &PgPool, t: &Ticket, from: State) -> Result<()> {
    let mut tx = pool.begin().await?;

    let stored: Option<(i32, NaiveDate, Uuid)> = sqlx::query_as(
        "SELECT sequence, issued_on, service_id FROM tickets WHERE id = $1",
    )
    .bind(t.id.0)
    .fetch_optional(&mut *tx)
    .await?;
    let Some((old_sequence, old_day, old_service)) = stored else {
        return Err(Error::NotFound(format!("ticket {}", t.id)));
    };
    let code_changed = (old_service, old_day, old_sequence)
        != (t.service_id.0, t.issued_on, t.code.sequence() as i32);
    if code_changed {
        ensure_not_retired(&mut *tx, t).await?;
    }

    let rows_affected = sqlx::query(
        "UPDATE tickets SET prefix = $1, sequence = $2, issued_on = $3, service_id = $4, service_name = $5,
                            state = $6, staff_id = $7, staff_name = $8, desk = $9, called_at = $10,
                            attended_at = $11, closed_at = $12, wait_seconds = $13, service_seconds = $14,
                            revision = $15
         WHERE id = $16 AND state = $17 AND revision = $15 - 1",
    )
    .bind(t.code.prefix())
    .bind(t.code.sequence() as i32)
    .bind(t.issued_on)
    .bind(t.service_id.0)
    .bind(&t.service_name)
    .bind(t.state.as_str())
    .bind(&t.staff_id)
    .bind(&t.staff_name)
    .bind(&t.desk)
    .bind(t.called_at)
    .bind(t.attended_at)
    .bind(t.closed_at)
    .bind(t.wait_seconds)
    .bind(t.service_seconds)
    .bind(t.revision as i32)
    .bind(t.id.0)
    .bind(from.as_str())
    .execute(&mut *tx)
    .await
    .map_err(|e| map_unique(e, |constraint| code_or_duplicate(constraint, t)))?
    .rows_affected();

    if rows_affected == 0 {
        return Err(Error::stale(format!(
            "ticket {} is no longer {from} at revision {}",
            t.id,
            t.revision.wrapping_sub(1)
        )));
    }

    if code_changed {
        sqlx::query(
            "INSERT INTO retired_codes (service_id, issued_on, sequence, ticket_id)
             VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
        )
        .bind(old_service)
        .bind(old_day)
        .bind(old_sequence)
        .bind(t.id.0)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Bump the (service, day) counter, seeding it past any code already used.
pub(super) async fn next_sequence(pool: &PgPool, service: ServiceId, day: NaiveDate) -> Result<u32> {
    let (value,): (i32,) = sqlx::query_as(
        "WITH used AS (
             SELECT GREATEST(
                 (SELECT COALESCE(MAX(sequence), 0) FROM tickets WHERE service_id = $1 AND issued_on = $2),
                 (SELECT COALESCE(MAX(sequence), 0) FROM retired_codes WHERE service_id = $1 AND issued_on = $2)
             ) AS floor
         )
         INSERT INTO ticket_sequences (service_id, issued_on, last_value)
         SELECT $1, $2, floor + 1 FROM used
         ON CONFLICT (service_id, issued_on)
         DO UPDATE SET last_value = GREATEST(ticket_sequences.last_value, EXCLUDED.last_value - 1) + 1
         RETURNING last_value",
    )
    .bind(service.0)
    .bind(day)
    .fetch_one(pool)
    .await?;
    u32::try_from(value).map_err(|_| Error::Other(format!("negative sequence {value}")))
}

pub(super) async fn find(pool: &PgPool, f: &TicketFilter) -> Result<Vec<Ticket>> {
    let states: Option<Vec<String>> = (!f.states.is_empty())
        .then(|| f.states.iter().map(|s| s.as_str().to_string()).collect());
    let services: Option<Vec<Uuid>> = f
        .service_ids
        .as_ref()
        .map(|ids| ids.iter().map(|id| id.0).collect());
    // LIMIT NULL returns every row.
    let limit: Option<i64> = f.limit.map(|n| i64::try_from(n).unwrap_or(i64::MAX));

    let rows: Vec<TicketRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM tickets
         WHERE ($1::text[] IS NULL OR state = ANY($1))
           AND ($2::uuid[] IS NULL OR service_id = ANY($2))
           AND ($3::text IS NULL OR staff_id = $3)
           AND ($4::text IS NULL OR priority = $4)
           AND ($5::text IS NULL OR document_number = $5)
           AND ($6::timestamptz IS NULL OR created_at >= $6)
           AND ($7::timestamptz IS NULL OR created_at < $7)
         ORDER BY CASE WHEN $8 THEN called_at END DESC NULLS LAST,
                  created_at, issued_on, sequence
         LIMIT $9"
    ))
    .bind(states)
    .bind(services)
    .bind(&f.staff_id)
    .bind(&f.priority)
    .bind(&f.document_number)
    .bind(f.created_from)
    .bind(f.created_before)
    .bind(f.order == TicketOrder::RecentlyCalled)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(TicketRow::try_into_ticket).collect()
}

async fn ensure_not_retired(tx: &mut sqlx::PgConnection, t: &Ticket) -> Result<()> {
    let (retired,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM retired_codes WHERE service_id = $1 AND issued_on = $2 AND sequence = $3)",
    )
    .bind(t.service_id.0)
    .bind(t.issued_on)
    .bind(t.code.sequence() as i32)
    .fetch_one(&mut *tx)
    .await?;
    if retired {
        return Err(Error::code_taken(format!(
            "code {} was already issued on {}",
            t.code, t.issued_on
        )));
    }
    Ok(())
}

fn code_or_duplicate(constraint: Option<&str>, t: &Ticket) -> Error {
    match constraint {
        Some("tickets_code_key") => Error::code_taken(format!(
            "code {} already issued on {}",
            t.code, t.issued_on
        )),
        _ => Error::duplicate(format!("ticket {} already exists", t.id)),
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    prefix: String,
    sequence: i32,
    issued_on: NaiveDate,
    service_id: Uuid,
    service_name: String,
    priority: Option<String>,
    notes: Option<String>,
    state: String,
    staff_id: Option<String>,
    staff_name: Option<String>,
    desk: Option<String>,
    created_at: DateTime<Utc>,
    called_at: Option<DateTime<Utc>>,
    attended_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    wait_seconds: Option<i64>,
    service_seconds: Option<i64>,
    document_type: String,
    document_number: String,
    full_name: String,
    phone: String,
    email: String,
    category: String,
    revision: i32,
}

impl TicketRow {
    fn try_into_ticket(self) -> Result<Ticket> {
        Ok(Ticket {
            id: TicketId(self.id),
            code: TicketCode::new(self.prefix, self.sequence as u32),
            issued_on: self.issued_on,
            service_id: ServiceId(self.service_id),
            service_name: self.service_name,
            priority: self.priority,
            notes: self.notes,
            state: self.state.parse()?,
            staff_id: self.staff_id,
            staff_name: self.staff_name,
            desk: self.desk,
            created_at: self.created_at,
            called_at: self.called_at,
            attended_at: self.attended_at,
            closed_at: self.closed_at,
            wait_seconds: self.wait_seconds,
            service_seconds: self.service_seconds,
            requester: Requester {
                document_type: self.document_type,
                document_number: self.document_number,
                full_name: self.full_name,
                phone: self.phone,
                email: self.email,
                category: self.category,
            },
            revision: self.revision as u32,
        })
    }
}
