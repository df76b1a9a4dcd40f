//! Configuration singleton and the requester cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ticket::Requester;
use crate::error::{Error, Result};

/// Site-wide settings, created with defaults on first read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Recognized priority labels, in display order.
    pub priority_labels: Vec<String>,
    /// Whether a receipt should be printed when a ticket is issued.
    pub print_on_create: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            priority_labels: vec![
                "Disability".to_string(),
                "Pregnancy".to_string(),
                "Senior".to_string(),
            ],
            print_on_create: true,
        }
    }
}

impl Settings {
    pub fn recognizes(&self, label: &str) -> bool {
        self.priority_labels.iter().any(|l| l == label)
    }

    /// Apply a validated update.
    pub fn apply(&mut self, update: SettingsUpdate) -> Result<()> {
        if update.is_empty() {
            return Err(Error::Validation("nothing to update".to_string()));
        }
        if let Some(labels) = update.priority_labels {
            let mut cleaned: Vec<String> = Vec::with_capacity(labels.len());
            for label in labels {
                let label = label.trim().to_string();
                if label.is_empty() {
                    return Err(Error::Validation("empty priority label".to_string()));
                }
                if cleaned.contains(&label) {
                    return Err(Error::Validation(format!(
                        "duplicate priority label {label:?}"
                    )));
                }
                cleaned.push(label);
            }
            self.priority_labels = cleaned;
        }
        if let Some(print) = update.print_on_create {
            self.print_on_create = print;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub priority_labels: Option<Vec<String>>,
    pub print_on_create: Option<bool>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.priority_labels.is_none() && self.print_on_create.is_none()
    }
}

/// Latest known contact details for a document number.
///
/// Only used to pre-fill new tickets; tickets keep their own snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    #[serde(flatten)]
    pub details: Requester,
    pub updated_at: DateTime<Utc>,
}

impl Party {
    pub fn document_number(&self) -> &str {
        &self.details.document_number
    }
}
