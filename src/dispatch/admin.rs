//! Service catalog and settings administration.

use chrono::Utc;
use tracing::info;

use super::Dispatcher;
use crate::error::{Error, Result};
use crate::model::*;
use crate::notify::Notifier;
use crate::store::TicketStore;

fn require_admin(actor: &Identity, what: &str) -> Result<()> {
    if actor.role == Role::Admin {
        Ok(())
    } else {
        Err(Error::Forbidden(format!(
            "role {} may not {what}",
            actor.role
        )))
    }
}

impl<S: TicketStore, N: Notifier> Dispatcher<S, N> {
    /// All services, ordered by prefix. Open to any identity.
    pub async fn list_services(&self) -> Result<Vec<Service>> {
        self.bounded(self.store.list_services()).await
    }

    pub async fn create_service(&self, actor: &Identity, new: NewService) -> Result<Service> {
        require_admin(actor, "manage services")?;
        let name = new.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("service name is required".to_string()));
        }
        let service = Service {
            id: ServiceId::new(),
            name: name.to_string(),
            prefix: normalize_prefix(&new.prefix)?,
            active: true,
            created_at: Utc::now(),
        };
        self.bounded(self.store.insert_service(&service)).await?;
        info!(service_id = %service.id, prefix = %service.prefix, name = %service.name, "service created");
        Ok(service)
    }

    /// Rename, re-prefix, or (de)activate a service.
    ///
    /// The prefix is frozen once any ticket was issued against the service,
    /// since existing codes would stop matching it.
    pub async fn update_service(
        &self,
        actor: &Identity,
        id: ServiceId,
        update: ServiceUpdate,
    ) -> Result<Service> {
        require_admin(actor, "manage services")?;
        if update.is_empty() {
            return Err(Error::Validation("nothing to update".to_string()));
        }
        let mut service = self.bounded(self.store.get_service(id)).await?;

        if let Some(name) = update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::Validation("service name is required".to_string()));
            }
            service.name = name.to_string();
        }
        if let Some(prefix) = update.prefix {
            // The store refuses the change atomically if tickets exist.
            service.prefix = normalize_prefix(&prefix)?;
        }
        if let Some(active) = update.active {
            service.active = active;
        }

        self.bounded(self.store.update_service(&service)).await?;
        info!(service_id = %service.id, prefix = %service.prefix, active = service.active, "service updated");
        Ok(service)
    }

    pub async fn settings(&self) -> Result<Settings> {
        self.bounded(self.store.get_settings()).await
    }

    pub async fn update_settings(&self, actor: &Identity, update: SettingsUpdate) -> Result<Settings> {
        require_admin(actor, "change settings")?;
        let mut settings = self.bounded(self.store.get_settings()).await?;
        settings.apply(update)?;
        self.bounded(self.store.put_settings(&settings)).await?;
        info!(
            labels = ?settings.priority_labels,
            print_on_create = settings.print_on_create,
            "settings updated"
        );
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_admins_pass() {
        assert!(require_admin(&Identity::new("a", "A", Role::Admin), "x").is_ok());
        for role in [Role::Staff, Role::FrontDesk] {
            let err = require_admin(&Identity::new("u", "U", role), "x").unwrap_err();
            assert!(matches!(err, Error::Forbidden(_)));
        }
    }
}
