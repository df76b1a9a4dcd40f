//! Service catalog files.
//!
//! A catalog is a TOML file listing the services a site offers:
//!
//! ```toml
//! [[service]]
//! name = "Admissions"
//! prefix = "A"
//! ```
//!
//! Importing creates the services whose prefix is not registered yet and
//! leaves existing ones untouched.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::model::{Identity, NewService, normalize_prefix};
use crate::notify::Notifier;
use crate::store::TicketStore;

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    service: Vec<NewService>,
}

/// Services parsed from a catalog file, in file order.
#[derive(Debug, Clone, Default)]
pub struct ServiceCatalog {
    services: Vec<NewService>,
}

/// Outcome of [`ServiceCatalog::import`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: Vec<String>,
    pub skipped: Vec<String>,
}

impl ServiceCatalog {
    /// Parse catalog TOML. Prefixes are validated here so a bad file fails
    /// before anything is written.
    pub fn parse(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("bad service catalog: {e}")))?;
        let mut seen = Vec::with_capacity(file.service.len());
        for entry in &file.service {
            let prefix = normalize_prefix(&entry.prefix)?;
            if seen.contains(&prefix) {
                return Err(Error::Config(format!(
                    "prefix {prefix} listed twice in service catalog"
                )));
            }
            seen.push(prefix);
        }
        Ok(Self {
            services: file.service,
        })
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read service catalog {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    pub fn services(&self) -> &[NewService] {
        &self.services
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Create every listed service whose prefix is free.
    pub async fn import<S: TicketStore, N: Notifier>(
        &self,
        dispatcher: &Dispatcher<S, N>,
        actor: &Identity,
    ) -> Result<ImportSummary> {
        let existing: Vec<String> = dispatcher
            .list_services()
            .await?
            .into_iter()
            .map(|s| s.prefix)
            .collect();

        let mut summary = ImportSummary::default();
        for entry in &self.services {
            let prefix = normalize_prefix(&entry.prefix)?;
            if existing.contains(&prefix) {
                summary.skipped.push(prefix);
                continue;
            }
            let service = dispatcher.create_service(actor, entry.clone()).await?;
            summary.created.push(service.prefix);
        }
        info!(
            created = summary.created.len(),
            skipped = summary.skipped.len(),
            "service catalog imported"
        );
        Ok(summary)
    }
}
