//! Wire protocol for Cardforge: packet framing, the tagged binary codec,
//! and the per-connection request/reply/notify router.
//!
//! - **Packet types** ([`Packet`], [`PacketType`], [`PlayerId`], [`RoomId`],
//!   [`ConnId`]) — the framed unit every command decodes into.
//! - **Codec** ([`Codec`] trait, [`CborCodec`], [`encode_packet`]/
//!   [`decode_packet`]) — how packets and their payloads become bytes.
//! - **Router** ([`Router`], [`RouterWait`]) — per-connection request
//!   allocation, reply matching, and cancellation.
//!
//! # Architecture
//!
//! ```text
//! Transport (length-prefixed bytes) → Codec (Packet) → Router (reply matching) → Session
//! ```

mod codec;
mod error;
mod packet;
mod router;

pub use codec::{CborCodec, Codec, decode_packet, encode_packet};
pub use error::{RouterError, WireError};
pub use packet::{
    ConnId, Packet, PacketType, PlayerId, RoomId, REQUEST_ID_NOTIFICATION, REQUEST_ID_UNSOLICITED,
    REQUEST_ID_WRAP,
};
pub use router::{Router, RouterWait};
