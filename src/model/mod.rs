//! Core data model.
//!
//! A ticket is one client's place in a service queue. It has a display code
//! issued per service per day, a lifecycle state, the staff member handling
//! it, and a snapshot of who asked for it.

pub mod identity;
pub mod service;
pub mod settings;
pub mod ticket;

pub use identity::{Identity, Role};
pub use service::{MAX_PREFIX_LEN, NewService, Service, ServiceId, ServiceUpdate, normalize_prefix};
pub use settings::{Party, Settings, SettingsUpdate};
pub use ticket::{NewTicket, Operation, Requester, State, Ticket, TicketCode, TicketId};
