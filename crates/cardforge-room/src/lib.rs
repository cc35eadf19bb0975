//! Lobby and room state machines for Cardforge.
//!
//! This crate holds everything about where a connection sits once it's
//! past authentication: the lobby every connection starts in, the rooms
//! players create and join, and the state machine each room runs through
//! from `Idle` to `Abandoned` (§4.6, §4.7).
//!
//! It does not run game rules — those live in an external script engine
//! reached through a `ScriptEngine` trait seam, the same "trait at the
//! seam" shape [`RoomManager`] itself uses for [`ChatStore`]/[`StatsStore`]
//! to stay ignorant of SQL.

#![allow(async_fn_in_trait)]

mod base;
mod chat;
mod error;
mod lobby;
mod manager;
mod room;
mod settings;

pub use base::RoomBase;
pub use chat::{decode_chat, should_broadcast, ChatMessage, ChatScope, ChatStore, MuteStatus};
pub use error::{PersistenceError, RoomError};
pub use lobby::{Lobby, RoomListing};
pub use manager::{is_fully_muted, RoomManager, FEATURE_ADD_ROBOT, FEATURE_CHANGE_ROOM};
pub use room::{PlayerOutcome, Room, RoomState, StatsStore, ThreadId};
pub use settings::{clamp_capacity, parse_settings, RoomSettings, DEFAULT_CAPACITY, MAX_CAPACITY};
