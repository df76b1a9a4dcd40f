//! The dispatcher: single entry point for ticket operations.
//!
//! Every operation follows the same order: validate input, load the
//! records, run the state machine (and the sequencer when a code is
//! needed), persist, then notify. Notification runs only after the write
//! succeeded and its failure never undoes the write.

pub mod admin;
pub mod machine;
pub mod queue;
pub mod report;
pub mod sequencer;

use std::future::Future;

use chrono::{DateTime, Days, Utc};
use opentelemetry::KeyValue;
use tracing::{Instrument, Span, debug, info, warn};

use crate::config::DispatchConfig;
use crate::error::{Error, Result};
use crate::event::{EventKind, TicketEvent};
use crate::model::*;
use crate::notify::Notifier;
use crate::store::{TicketFilter, TicketStore};
use crate::telemetry::dispatch::{record_state_transition, record_ticket, start_operation_span};
use crate::telemetry::metrics;

pub use queue::{PendingQueue, QueueScope};
pub use report::{Report, ReportFilter, StateCounts};
pub use sequencer::Sequencer;

/// Owns the storage client and the notifier; enforces every ticket invariant.
pub struct Dispatcher<S, N> {
    store: S,
    notifier: N,
    sequencer: Sequencer,
    config: DispatchConfig,
}

impl<S: TicketStore, N: Notifier> Dispatcher<S, N> {
    pub fn new(store: S, notifier: N, config: DispatchConfig) -> Self {
        Self {
            store,
            notifier,
            sequencer: Sequencer::new(config.sequence_attempts),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Lifecycle operations
    // -----------------------------------------------------------------------

    /// Issue a ticket with the next code of its service for today.
    pub async fn create(&self, actor: &Identity, request: NewTicket) -> Result<Ticket> {
        let span = start_operation_span(Operation::Create, actor);
        let result = self
            .create_inner(actor, request, &span)
            .instrument(span.clone())
            .await;
        observe(Operation::Create, &result);
        result
    }

    /// Call a waiting ticket to the actor's desk.
    pub async fn call(
        &self,
        actor: &Identity,
        id: TicketId,
        desk: Option<String>,
    ) -> Result<Ticket> {
        self.transition(Operation::Call, actor, id, |ticket, now| {
            machine::call(ticket, actor, desk.as_deref(), now)
        })
        .await
    }

    /// Call the head of the actor's queue. `Ok(None)` when nothing is waiting.
    ///
    /// Another desk may take the head between reading the queue and calling
    /// it; the queue is then read again, a bounded number of times.
    pub async fn call_next(&self, actor: &Identity, desk: Option<String>) -> Result<Option<Ticket>> {
        if !machine::permits(Operation::Call, actor.role) {
            return Err(Error::Forbidden(format!(
                "role {} may not call tickets",
                actor.role
            )));
        }
        let max_attempts = self.config.call_next_attempts.max(1);
        let mut attempt = 1;
        loop {
            let queue = self.pending_queue(actor, QueueScope::Assigned).await?;
            let Some(head) = queue.head() else {
                return Ok(None);
            };
            match self.call(actor, head.id, desk.clone()).await {
                Ok(ticket) => return Ok(Some(ticket)),
                Err(e @ (Error::Conflict { .. } | Error::InvalidTransition { .. }))
                    if attempt < max_attempts =>
                {
                    debug!(ticket_id = %head.id, code = %head.code, attempt, error = %e, "lost queue head, re-reading");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Start serving a called ticket.
    pub async fn attend(&self, actor: &Identity, id: TicketId) -> Result<Ticket> {
        self.transition(Operation::Attend, actor, id, |ticket, now| {
            machine::attend(ticket, actor, now)
        })
        .await
    }

    /// Finish a called or serving ticket.
    pub async fn close(&self, actor: &Identity, id: TicketId) -> Result<Ticket> {
        let closed = self
            .transition(Operation::Close, actor, id, |ticket, now| {
                machine::close(ticket, actor, now)
            })
            .await?;
        if let Some(seconds) = closed.service_seconds {
            metrics::service_seconds().record(
                seconds as f64,
                &[KeyValue::new("service", closed.service_name.clone())],
            );
        }
        Ok(closed)
    }

    /// Withdraw a waiting ticket. Administrators only.
    pub async fn cancel(&self, actor: &Identity, id: TicketId) -> Result<Ticket> {
        self.transition(Operation::Cancel, actor, id, |ticket, now| {
            machine::cancel(ticket, actor, now)
        })
        .await
    }

    /// Move a ticket to `destination`'s queue under a new code.
    pub async fn redirect(
        &self,
        actor: &Identity,
        id: TicketId,
        destination: ServiceId,
    ) -> Result<Ticket> {
        let span = start_operation_span(Operation::Redirect, actor);
        let result = self
            .redirect_inner(actor, id, destination, &span)
            .instrument(span.clone())
            .await;
        observe(Operation::Redirect, &result);
        result
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Waiting tickets in dispatch order, limited to what `actor` may call.
    pub async fn pending_queue(&self, actor: &Identity, scope: QueueScope) -> Result<PendingQueue> {
        let allowed = actor.service_scope();
        let services = match scope {
            QueueScope::Assigned => allowed.map(<[ServiceId]>::to_vec),
            QueueScope::Service(id) => {
                if allowed.is_some_and(|ids| !ids.contains(&id)) {
                    return Err(Error::Forbidden(format!(
                        "{} is not assigned to service {id}",
                        actor.id
                    )));
                }
                Some(vec![id])
            }
        };
        let filter = TicketFilter {
            service_ids: services,
            ..TicketFilter::in_states([State::Created])
        };
        let tickets = self.bounded(self.store.find_tickets(&filter)).await?;
        Ok(PendingQueue::new(tickets))
    }

    /// Most recently called tickets, newest call first.
    /// Feeds the public display; needs no identity.
    pub async fn recently_called(&self, limit: Option<usize>) -> Result<Vec<Ticket>> {
        let limit = limit.unwrap_or(self.config.recent_limit);
        let filter = TicketFilter::in_states([State::Called, State::Serving, State::Closed])
            .recently_called_first()
            .limit(limit);
        self.bounded(self.store.find_tickets(&filter)).await
    }

    /// Every ticket issued today, newest first. Front desk and admins only.
    pub async fn todays_tickets(&self, actor: &Identity) -> Result<Vec<Ticket>> {
        if !matches!(actor.role, Role::Admin | Role::FrontDesk) {
            return Err(Error::Forbidden(format!(
                "role {} may not list today's tickets",
                actor.role
            )));
        }
        let (from, before) = self.today_bounds(Utc::now());
        let filter = TicketFilter::default().created_between(from, before);
        let mut tickets = self.bounded(self.store.find_tickets(&filter)).await?;
        tickets.reverse();
        Ok(tickets)
    }

    pub async fn get_ticket(&self, id: TicketId) -> Result<Ticket> {
        self.bounded(self.store.get_ticket(id)).await
    }

    /// Contact details to pre-fill a ticket: the party record, else the
    /// snapshot on the requester's latest ticket.
    pub async fn lookup_party(&self, document_number: &str) -> Result<Party> {
        let document_number = document_number.trim();
        if let Some(party) = self.bounded(self.store.get_party(document_number)).await? {
            return Ok(party);
        }
        let filter = TicketFilter {
            document_number: Some(document_number.to_string()),
            ..TicketFilter::default()
        };
        let tickets = self.bounded(self.store.find_tickets(&filter)).await?;
        tickets
            .into_iter()
            .last()
            .map(|t| Party {
                details: t.requester,
                updated_at: t.created_at,
            })
            .ok_or_else(|| Error::NotFound(format!("party {document_number}")))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn create_inner(
        &self,
        actor: &Identity,
        request: NewTicket,
        span: &Span,
    ) -> Result<Ticket> {
        let settings = self.bounded(self.store.get_settings()).await?;
        let request = validate_request(request, &settings)?;
        let service = match self.bounded(self.store.get_service(request.service_id)).await {
            Err(Error::NotFound(_)) => {
                return Err(Error::Validation(format!(
                    "unknown service {}",
                    request.service_id
                )));
            }
            other => other?,
        };
        machine::ensure_create(actor, &service)?;

        let now = Utc::now();
        let day = self.config.service_day(now);
        let ticket = self
            .bounded(self.sequencer.issue(&self.store, &service, day, |code| {
                let ticket = machine::issue(request.clone(), &service, code, day, now);
                async move {
                    self.store.create_ticket(&ticket).await?;
                    Ok(ticket)
                }
            }))
            .await?;
        record_ticket(span, &ticket.id, &ticket.code);

        info!(
            ticket_id = %ticket.id,
            code = %ticket.code,
            service = %service.prefix,
            priority = ticket.priority.as_deref().unwrap_or("-"),
            "ticket created"
        );
        metrics::tickets_created().add(
            1,
            &[
                KeyValue::new("service", service.prefix.clone()),
                KeyValue::new("priority", if ticket.is_priority() { "yes" } else { "no" }),
            ],
        );

        self.remember_party(&ticket).await;
        self.publish(EventKind::Created, &ticket).await;
        Ok(ticket)
    }

    async fn redirect_inner(
        &self,
        actor: &Identity,
        id: TicketId,
        destination: ServiceId,
        span: &Span,
    ) -> Result<Ticket> {
        let current = self.bounded(self.store.get_ticket(id)).await?;
        record_ticket(span, &current.id, &current.code);
        // Check guards before burning a code from the destination sequence.
        machine::ensure(Operation::Redirect, actor, &current)?;
        let service = match self.bounded(self.store.get_service(destination)).await {
            Err(Error::NotFound(_)) => {
                return Err(Error::Validation(format!("unknown service {destination}")));
            }
            other => other?,
        };
        machine::ensure_open(&service)?;

        let now = Utc::now();
        let day = self.config.service_day(now);
        let from = current.state;
        let next = self
            .bounded(self.sequencer.issue(&self.store, &service, day, |code| {
                let next = machine::redirect(&current, actor, &service, code, day);
                async move {
                    let next = next?;
                    self.store.update_ticket(&next, from).await?;
                    Ok(next)
                }
            }))
            .await?;

        record_state_transition(span, from.as_str(), next.state.as_str());
        info!(
            ticket_id = %next.id,
            old_code = %current.code,
            code = %next.code,
            from_service = %current.service_name,
            to_service = %next.service_name,
            "ticket redirected"
        );
        count_transition(Operation::Redirect, from, next.state);
        self.publish(EventKind::Redirected, &next).await;
        Ok(next)
    }

    /// Load, apply, conditionally write, notify.
    async fn transition<F>(
        &self,
        op: Operation,
        actor: &Identity,
        id: TicketId,
        apply: F,
    ) -> Result<Ticket>
    where
        F: FnOnce(&Ticket, DateTime<Utc>) -> Result<Ticket> + Send,
    {
        let span = start_operation_span(op, actor);
        let result = async {
            let current = self.bounded(self.store.get_ticket(id)).await?;
            record_ticket(&span, &current.id, &current.code);
            let next = apply(&current, Utc::now())?;
            self.bounded(self.store.update_ticket(&next, current.state))
                .await?;

            record_state_transition(&span, current.state.as_str(), next.state.as_str());
            info!(ticket_id = %next.id, code = %next.code, from = %current.state, to = %next.state, "ticket {op}");
            count_transition(op, current.state, next.state);
            if op == Operation::Call {
                if let Some(seconds) = next.wait_seconds {
                    metrics::wait_seconds().record(
                        seconds as f64,
                        &[KeyValue::new("service", next.service_name.clone())],
                    );
                }
            }

            self.publish(EventKind::from(op), &next).await;
            Ok::<_, Error>(next)
        }
        .instrument(span.clone())
        .await;
        observe(op, &result);
        result
    }

    /// Upsert the party cache from a fresh ticket. Best-effort.
    async fn remember_party(&self, ticket: &Ticket) {
        let party = Party {
            details: ticket.requester.clone(),
            updated_at: ticket.created_at,
        };
        if let Err(e) = self.bounded(self.store.upsert_party(&party)).await {
            warn!(ticket_id = %ticket.id, error = %e, "failed to update party record");
        }
    }

    /// Fire-and-forget. Failures are logged and counted, never returned.
    async fn publish(&self, kind: EventKind, ticket: &Ticket) {
        let event = TicketEvent::new(kind, ticket.clone());
        if let Err(e) = self.bounded(self.notifier.publish(&event)).await {
            debug!(ticket_id = %ticket.id, %kind, error = %e, "event dropped");
            metrics::notifications_dropped().add(1, &[KeyValue::new("kind", kind.as_str())]);
        }
    }

    /// Apply the configured storage timeout to `fut`.
    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.config.store_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => fut.await,
        }
    }

    /// [start, end) of the service day containing `now`.
    fn today_bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let today = self.config.service_day(now);
        let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
        (self.config.day_start(today), self.config.day_start(tomorrow))
    }
}

/// Normalize a ticket request and check it against the settings.
fn validate_request(mut request: NewTicket, settings: &Settings) -> Result<NewTicket> {
    let r = &mut request.requester;
    r.document_type = r.document_type.trim().to_string();
    r.document_number = r.document_number.trim().to_string();
    r.full_name = r.full_name.trim().to_string();
    r.phone = r.phone.trim().to_string();
    r.email = r.email.trim().to_string();
    r.category = r.category.trim().to_string();
    if r.document_number.is_empty() {
        return Err(Error::Validation("document number is required".to_string()));
    }
    if r.full_name.is_empty() {
        return Err(Error::Validation("full name is required".to_string()));
    }
    if !r.email.contains('@') {
        return Err(Error::Validation(format!("invalid email {:?}", r.email)));
    }

    request.priority = request
        .priority
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());
    if let Some(label) = &request.priority {
        if !settings.recognizes(label) {
            return Err(Error::Validation(format!(
                "unknown priority label {label:?}"
            )));
        }
    }
    request.notes = request
        .notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    Ok(request)
}

fn count_transition(op: Operation, from: State, to: State) {
    metrics::ticket_transitions().add(
        1,
        &[
            KeyValue::new("operation", op.as_str()),
            KeyValue::new("from", from.as_str()),
            KeyValue::new("to", to.as_str()),
        ],
    );
}

/// Log and count a failed operation.
fn observe<T>(op: Operation, result: &Result<T>) {
    let Err(e) = result else {
        return;
    };
    match e {
        Error::NotFound(_)
        | Error::InvalidTransition { .. }
        | Error::Forbidden(_)
        | Error::Validation(_)
        | Error::Conflict { .. } => {
            info!(operation = %op, error = %e, "operation rejected");
        }
        _ => warn!(operation = %op, error = %e, "operation failed"),
    }
    metrics::operations_rejected().add(
        1,
        &[
            KeyValue::new("operation", op.as_str()),
            KeyValue::new("reason", e.reason()),
        ],
    );
}
