//! Error types for counterq.

use std::time::Duration;

use thiserror::Error;

use crate::model::{Operation, State};

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition: cannot {op} a ticket in state {from}")]
    InvalidTransition { from: State, op: Operation },

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A concurrent write won.
    #[error("conflict: {detail}")]
    Conflict { kind: ConflictKind, detail: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),

    #[error("notification failed: {0}")]
    Notify(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// What a [`Error::Conflict`] collided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The display code is already issued for that service and day.
    Code,
    /// The record changed between read and conditional write.
    Stale,
    /// A unique key other than the code (service prefix, record id).
    Duplicate,
}

impl Error {
    pub fn code_taken(detail: impl Into<String>) -> Self {
        Error::Conflict {
            kind: ConflictKind::Code,
            detail: detail.into(),
        }
    }

    pub fn stale(detail: impl Into<String>) -> Self {
        Error::Conflict {
            kind: ConflictKind::Stale,
            detail: detail.into(),
        }
    }

    /// A service's prefix cannot change once tickets carry it.
    pub fn prefix_frozen(service_name: &str) -> Self {
        Error::Validation(format!(
            "service {service_name} already has tickets; its prefix cannot change"
        ))
    }

    pub fn duplicate(detail: impl Into<String>) -> Self {
        Error::Conflict {
            kind: ConflictKind::Duplicate,
            detail: detail.into(),
        }
    }

    /// Whether the caller may reasonably retry the same request.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Conflict { .. } | Error::Timeout(_))
    }

    /// Short machine-readable label, used as a metric attribute.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::Forbidden(_) => "forbidden",
            Error::Conflict { .. } => "conflict",
            Error::Validation(_) => "validation",
            Error::Timeout(_) => "timeout",
            Error::Notify(_) => "notify",
            Error::Config(_) => "config",
            Error::Database(_) => "database",
            Error::Io(_) => "io",
            Error::Other(_) => "other",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
