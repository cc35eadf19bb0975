//! Error types for authentication and the player registry.

use cardforge_protocol::PlayerId;

/// Why a Setup packet was rejected. Each variant maps to one of the
/// early-packet replies the auth manager sends before closing the socket.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("setup packet malformed: {0}")]
    MalformedSetup(String),

    #[error("password decryption failed")]
    BadCredential,

    #[error("screen name rejected: {0}")]
    NameRejected(String),

    #[error("uuid is banned")]
    UuidBanned,

    #[error("content package out of date")]
    PackageOutdated,

    #[error("account password incorrect")]
    WrongPassword,

    #[error("account is banned")]
    AccountBanned,

    #[error("device uuid has reached the account limit")]
    DeviceAccountLimitReached,

    #[error("rsa key error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("key storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the player registry.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no player registered for id {0}")]
    NotFound(PlayerId),

    #[error("player {0} is already online")]
    AlreadyOnline(PlayerId),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("account persistence lookup failed: {0}")]
    Persistence(String),
}
