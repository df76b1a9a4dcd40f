//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. Sensitive values wrapped in secrecy::SecretString to prevent
//! log leaks.

pub mod secrets;

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset as _, Utc};
use secrecy::SecretString;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Buffer size of the in-process event bus.
    pub event_capacity: usize,
    pub dispatch: DispatchConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = DispatchConfig::default();
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_capacity: parsed_var("EVENT_CHANNEL_CAPACITY")?.unwrap_or(256),
            dispatch: DispatchConfig {
                day_offset: parsed_var("SERVICE_DAY_OFFSET")?.unwrap_or(defaults.day_offset),
                sequence_attempts: parsed_var("SEQUENCE_ATTEMPTS")?
                    .unwrap_or(defaults.sequence_attempts),
                store_timeout: parsed_var::<u64>("STORE_TIMEOUT_MS")?.map(Duration::from_millis),
                ..defaults
            },
        })
    }
}

/// Engine-level knobs.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// UTC offset whose midnight starts a new service day (codes restart at 001).
    pub day_offset: FixedOffset,
    /// Code allocations attempted before a collision is surfaced.
    pub sequence_attempts: u32,
    /// Bound on every storage call. `None` waits indefinitely.
    pub store_timeout: Option<Duration>,
    /// Times `call_next` re-reads the queue after losing the head to another desk.
    pub call_next_attempts: u32,
    /// Default length of the recently-called display list.
    pub recent_limit: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            day_offset: Utc.fix(),
            sequence_attempts: 5,
            store_timeout: None,
            call_next_attempts: 3,
            recent_limit: 10,
        }
    }
}

impl DispatchConfig {
    /// The service day `at` falls on.
    pub fn service_day(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.day_offset).date_naive()
    }

    /// First instant of `day` in UTC.
    pub fn day_start(&self, day: NaiveDate) -> DateTime<Utc> {
        let local = day.and_time(chrono::NaiveTime::MIN);
        (local - self.day_offset).and_utc()
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid {name}={raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}
