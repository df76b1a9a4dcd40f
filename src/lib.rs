//! # counterq
//!
//! Ticket dispatch engine for service counters.
//!
//! Issues per-service, per-day display codes, moves tickets through their
//! lifecycle under role and assignment rules, orders pending queues with
//! priority labels first, and fans lifecycle events out to displays.
//! Storage is behind [`store::TicketStore`] with Postgres ([`db::Db`]) and
//! in-memory ([`store::MemoryStore`]) adapters.

pub mod catalog;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod model;
pub mod notify;
pub mod store;
pub mod telemetry;
