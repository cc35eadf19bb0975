//! Unified error type for the server.

use cardforge_protocol::{RouterError, WireError};
use cardforge_room::RoomError;
use cardforge_session::{AuthError, SessionError};
use cardforge_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// `#[from]` on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error("persistence error: {0}")]
    Persist(#[from] cardforge_persist::PersistError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardforge_protocol::RoomId;

    #[test]
    fn from_wire_error() {
        let err = WireError::InvalidPacket("bad frame".into());
        let server_err: ServerError = err.into();
        assert!(matches!(server_err, ServerError::Wire(_)));
    }

    #[test]
    fn from_auth_error() {
        let err = AuthError::WrongPassword;
        let server_err: ServerError = err.into();
        assert!(matches!(server_err, ServerError::Auth(_)));
    }

    #[test]
    fn from_session_error() {
        let err = SessionError::NotFound(cardforge_protocol::PlayerId(7));
        let server_err: ServerError = err.into();
        assert!(matches!(server_err, ServerError::Session(_)));
    }

    #[test]
    fn from_room_error() {
        let err = RoomError::NotFound(RoomId(1));
        let server_err: ServerError = err.into();
        assert!(matches!(server_err, ServerError::Room(_)));
    }
}
