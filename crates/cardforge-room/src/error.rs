//! Error types for the lobby/room layer.

use cardforge_protocol::{PlayerId, RoomId};

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("room {0} not found")]
    NotFound(RoomId),

    #[error("room {0} is full")]
    RoomFull(RoomId),

    #[error("room {0} has already started")]
    AlreadyStarted(RoomId),

    #[error("password does not match")]
    PasswordMismatch,

    #[error("player {0} already in room {1}")]
    AlreadyInRoom(PlayerId, RoomId),

    #[error("player {0} not in room {1}")]
    NotInRoom(PlayerId, RoomId),

    #[error("player {0} is not the owner of room {1}")]
    NotOwner(PlayerId, RoomId),

    #[error("feature {0:?} is disabled")]
    FeatureDisabled(String),

    #[error("invalid room state for this operation: {0}")]
    InvalidState(String),

    #[error("chat message rejected")]
    ChatRejected,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// The failure shape reported by the [`crate::ChatStore`]/[`crate::StatsStore`]
/// seams — room logic never sees a concrete SQL error type.
#[derive(Debug, thiserror::Error)]
#[error("room persistence lookup failed: {0}")]
pub struct PersistenceError(pub String);
