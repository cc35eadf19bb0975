//! Embedded SQL persistence for Cardforge.
//!
//! Two handles, matching the two databases and their different latency
//! budgets (§4.10, §5):
//!
//! - [`AuthDb`] — accounts, device uuids, bans, mutes. Short queries,
//!   run directly on the caller's reactor.
//! - [`DbWorker`] — game saves. Runs on its own dedicated OS thread so a
//!   slow write never stalls the main reactor.
//!
//! [`hygiene`] provides the SQL-safety predicate (P7) and hex-literal
//! embedding every externally-supplied name or value must go through
//! before it's spliced into SQL text.

mod auth_db;
mod error;
pub mod hygiene;
mod value;
mod worker;

pub use auth_db::AuthDb;
pub use error::PersistError;
pub use value::SqlValue;
pub use worker::DbWorker;
