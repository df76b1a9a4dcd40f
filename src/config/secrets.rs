//! Secret handling utilities.

use std::str::FromStr;

pub use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgConnectOptions;

/// A connection target safe to log, rebuilt from the parsed options so
/// the password never appears.
///
/// `postgres://user:pw@host/db` becomes `postgres://user@host:5432/db`.
pub fn redacted_url(url: &SecretString) -> String {
    let Ok(options) = PgConnectOptions::from_str(url.expose_secret()) else {
        return "<unparseable database url>".to_string();
    };
    format!(
        "postgres://{}@{}:{}/{}",
        options.get_username(),
        options.get_host(),
        options.get_port(),
        options.get_database().unwrap_or_default()
    )
}
