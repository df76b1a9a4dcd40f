//! In-process store.
//!
//! One mutex guards everything, which makes every trait method a single
//! serialized step: sequence allocation and conditional updates are atomic
//! without further coordination. No method holds the lock across an await.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;

use super::{TicketFilter, TicketStore};
use crate::error::{Error, Result};
use crate::model::*;

/// Code key: (service, issue day, sequence).
type CodeKey = (ServiceId, NaiveDate, u32);

#[derive(Default)]
struct Inner {
    tickets: HashMap<TicketId, Ticket>,
    codes: HashSet<CodeKey>,
    sequences: HashMap<(ServiceId, NaiveDate), u32>,
    services: HashMap<ServiceId, Service>,
    parties: HashMap<String, Party>,
    settings: Option<Settings>,
}

impl Inner {
    fn prefix_taken(&self, prefix: &str, except: Option<ServiceId>) -> bool {
        self.services
            .values()
            .any(|s| s.prefix == prefix && Some(s.id) != except)
    }

    fn max_issued(&self, service: ServiceId, day: NaiveDate) -> u32 {
        self.codes
            .iter()
            .filter(|(s, d, _)| *s == service && *d == day)
            .map(|(_, _, seq)| *seq)
            .max()
            .unwrap_or(0)
    }
}

fn code_key(ticket: &Ticket) -> CodeKey {
    (ticket.service_id, ticket.issued_on, ticket.code.sequence())
}

/// Mutex-backed [`TicketStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Other("memory store lock poisoned".to_string()))
    }
}

impl TicketStore for MemoryStore {
    async fn get_ticket(&self, id: TicketId) -> Result<Ticket> {
        self.lock()?
            .tickets
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("ticket {id}")))
    }

    async fn create_ticket(&self, ticket: &Ticket) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.tickets.contains_key(&ticket.id) {
            return Err(Error::duplicate(format!("ticket {} already exists", ticket.id)));
        }
        if !inner.codes.insert(code_key(ticket)) {
            return Err(Error::code_taken(format!(
                "code {} already issued on {}",
                ticket.code, ticket.issued_on
            )));
        }
        inner.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn update_ticket(&self, ticket: &Ticket, from: State) -> Result<()> {
        let mut inner = self.lock()?;
        let stored = inner
            .tickets
            .get(&ticket.id)
            .ok_or_else(|| Error::NotFound(format!("ticket {}", ticket.id)))?;

        if stored.state != from || stored.revision.wrapping_add(1) != ticket.revision {
            return Err(Error::stale(format!(
                "ticket {} changed underfoot: expected {from} at revision {}, found {} at revision {}",
                ticket.id,
                ticket.revision.wrapping_sub(1),
                stored.state,
                stored.revision
            )));
        }

        let old_key = code_key(stored);
        let new_key = code_key(ticket);
        if old_key != new_key {
            if inner.codes.contains(&new_key) {
                return Err(Error::code_taken(format!(
                    "code {} already issued on {}",
                    ticket.code, ticket.issued_on
                )));
            }
            // Codes stay reserved after a redirect so they are never reissued.
            inner.codes.insert(new_key);
        }

        inner.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn next_sequence(&self, service: ServiceId, day: NaiveDate) -> Result<u32> {
        let mut inner = self.lock()?;
        let floor = inner.max_issued(service, day);
        let counter = inner.sequences.entry((service, day)).or_insert(0);
        *counter = (*counter).max(floor) + 1;
        Ok(*counter)
    }

    async fn find_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>> {
        let inner = self.lock()?;
        let mut found: Vec<Ticket> = inner
            .tickets
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        filter.arrange(&mut found);
        Ok(found)
    }

    async fn get_service(&self, id: ServiceId) -> Result<Service> {
        self.lock()?
            .services
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("service {id}")))
    }

    async fn list_services(&self) -> Result<Vec<Service>> {
        let mut services: Vec<Service> = self.lock()?.services.values().cloned().collect();
        services.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        Ok(services)
    }

    async fn insert_service(&self, service: &Service) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.prefix_taken(&service.prefix, None) {
            return Err(Error::duplicate(format!(
                "prefix {} already in use",
                service.prefix
            )));
        }
        inner.services.insert(service.id, service.clone());
        Ok(())
    }

    async fn update_service(&self, service: &Service) -> Result<()> {
        let mut inner = self.lock()?;
        let Some(stored) = inner.services.get(&service.id) else {
            return Err(Error::NotFound(format!("service {}", service.id)));
        };
        if stored.prefix != service.prefix
            && inner.tickets.values().any(|t| t.service_id == service.id)
        {
            return Err(Error::prefix_frozen(&stored.name));
        }
        if inner.prefix_taken(&service.prefix, Some(service.id)) {
            return Err(Error::duplicate(format!(
                "prefix {} already in use",
                service.prefix
            )));
        }
        inner.services.insert(service.id, service.clone());
        Ok(())
    }

    async fn get_party(&self, document_number: &str) -> Result<Option<Party>> {
        Ok(self.lock()?.parties.get(document_number).cloned())
    }

    async fn upsert_party(&self, party: &Party) -> Result<()> {
        let mut inner = self.lock()?;
        let newer_stored = inner
            .parties
            .get(party.document_number())
            .is_some_and(|stored| stored.updated_at > party.updated_at);
        if !newer_stored {
            inner
                .parties
                .insert(party.document_number().to_string(), party.clone());
        }
        Ok(())
    }

    async fn get_settings(&self) -> Result<Settings> {
        Ok(self.lock()?.settings.get_or_insert_with(Settings::default).clone())
    }

    async fn put_settings(&self, settings: &Settings) -> Result<()> {
        self.lock()?.settings = Some(settings.clone());
        Ok(())
    }
}
