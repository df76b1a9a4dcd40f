//! The acting identity passed into every dispatcher call.
//!
//! Authentication happens elsewhere; the engine only sees who is acting,
//! in what role, and which services they are assigned to.

use serde::{Deserialize, Serialize};

use super::service::ServiceId;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Unrestricted.
    Admin,
    /// Counter staff. Limited to their assigned services when calling.
    Staff,
    /// Reception: issues and closes tickets, never calls them.
    FrontDesk,
}

impl Role {
    /// Roles whose queue view and calls are restricted to assigned services.
    pub fn is_limited(self) -> bool {
        matches!(self, Role::Staff)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::FrontDesk => "frontdesk",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            "frontdesk" | "front-desk" | "front_desk" => Ok(Role::FrontDesk),
            other => Err(Error::Validation(format!("unknown role {other:?}"))),
        }
    }
}

/// Who is performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    pub role: Role,
    #[serde(default)]
    pub assigned_services: Vec<ServiceId>,
    /// The desk this person normally works at, if fixed.
    #[serde(default)]
    pub desk: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            role,
            assigned_services: Vec::new(),
            desk: None,
        }
    }

    pub fn assigned(mut self, services: impl IntoIterator<Item = ServiceId>) -> Self {
        self.assigned_services.extend(services);
        self
    }

    pub fn at_desk(mut self, desk: impl Into<String>) -> Self {
        self.desk = Some(desk.into());
        self
    }

    /// Whether this identity may act on tickets of `service`.
    pub fn covers(&self, service: ServiceId) -> bool {
        !self.role.is_limited() || self.assigned_services.contains(&service)
    }

    /// Service restriction for queue views: `None` means every service.
    pub fn service_scope(&self) -> Option<&[ServiceId]> {
        self.role
            .is_limited()
            .then_some(self.assigned_services.as_slice())
    }
}
