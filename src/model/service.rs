//! Services: the desks' lines of work, each with its own code prefix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A category of counter work with its own queue and code prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    /// Upper-case ASCII letters. Unique across services.
    pub prefix: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Newtype for service IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(pub Uuid);

impl ServiceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ServiceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ServiceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::Validation(format!("bad service id {s:?}: {e}")))
    }
}

/// Longest accepted prefix.
pub const MAX_PREFIX_LEN: usize = 5;

/// Trim and upper-case a prefix, rejecting anything but 1..=5 ASCII letters.
pub fn normalize_prefix(raw: &str) -> Result<String> {
    let prefix = raw.trim().to_ascii_uppercase();
    if prefix.is_empty()
        || prefix.len() > MAX_PREFIX_LEN
        || !prefix.bytes().all(|b| b.is_ascii_alphabetic())
    {
        return Err(Error::Validation(format!(
            "service prefix must be 1-{MAX_PREFIX_LEN} letters, got {raw:?}"
        )));
    }
    Ok(prefix)
}

/// Parameters for registering a service.
#[derive(Debug, Clone, Deserialize)]
pub struct NewService {
    pub name: String,
    pub prefix: String,
}

impl NewService {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
        }
    }
}

/// Partial update of a service. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ServiceUpdate {
    pub name: Option<String>,
    pub prefix: Option<String>,
    pub active: Option<bool>,
}

impl ServiceUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.prefix.is_none() && self.active.is_none()
    }
}
