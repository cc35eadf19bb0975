//! # Cardforge
//!
//! The top-level server crate: wires together `cardforge-protocol`,
//! `cardforge-transport`, `cardforge-persist`, `cardforge-session`,
//! `cardforge-room`, and `cardforge-worker` into a running process.
//!
//! [`state::ServerState`] is the single shared facade every connection
//! handler and background loop goes through; [`handler::handle_connection`]
//! is what each accepted socket runs.

pub mod config;
pub mod error;
pub mod handler;
pub mod state;
pub mod stores;

pub use config::ServerConfig;
pub use error::ServerError;
pub use state::ServerState;
