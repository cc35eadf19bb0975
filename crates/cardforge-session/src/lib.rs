//! Player authentication and registry for Cardforge.
//!
//! This crate handles everything about a player's identity and
//! connection lifecycle:
//!
//! 1. **Authentication** ([`auth`]) — the RSA keypair, password hashing,
//!    and Setup-packet parsing.
//! 2. **Account resolution** ([`registry::validate_setup`]) — turning a
//!    parsed Setup packet into an [`registry::Account`], via the
//!    [`registry::AccountStore`] seam.
//! 3. **Registry** ([`UserManager`]) — who's connected, who's a robot,
//!    and duplicate-login/reconnection handling (§4.4 step 10, P8).
//!
//! # How it fits in the stack
//!
//! ```text
//! Room layer (above)   ← looks up players to route gameplay packets
//!     ↕
//! Session layer (this crate)  ← player identity and connection state
//!     ↕
//! Protocol layer (below)  ← PlayerId, ConnId, Router
//! ```

#![allow(async_fn_in_trait)]

pub mod auth;
mod error;
mod player;
mod registry;

pub use auth::AuthManager;
pub use error::{AuthError, SessionError};
pub use player::{Player, PlayerState, MAX_TTL};
pub use registry::{AccountStore, Account, AdmitOutcome, SetupPolicy, UserManager, validate_setup};
