//! Error types for the wire/protocol layer.
//!
//! Each crate in this workspace defines its own error enum. Seeing a
//! `WireError` tells you the problem is in framing or encoding, not in
//! networking or room management.

/// Errors that can occur while encoding, decoding, or routing packets.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Serializing a value into the tagged binary encoding failed.
    #[error("encode failed: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),

    /// Parsing bytes into a typed value failed.
    #[error("decode failed: {0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),

    /// The decoded packet doesn't have the shape this protocol requires
    /// (wrong array length, unrecognized `type` bits, etc).
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// I/O failure while reading or writing a framed message.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the per-connection [`crate::Router`].
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// A request was already outstanding when another was sent; the
    /// router enforces at most one in flight per connection.
    #[error("a request is already outstanding on this connection")]
    RequestInFlight,

    /// The underlying connection closed while a request was pending.
    #[error("connection closed while waiting for a reply")]
    Cancelled,

    /// Lower-level wire failure.
    #[error(transparent)]
    Wire(#[from] WireError),
}
