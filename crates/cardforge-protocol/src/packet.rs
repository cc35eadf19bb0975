//! Packet framing: the `type` bitfield, request-id conventions, and the
//! [`Packet`] struct that every command on the wire decodes into.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A connection-scoped identifier, assigned by the acceptor when a socket
/// is accepted. Distinct from the player's account id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnId(pub i64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A player's stable account id. Positive for human accounts, negative
/// for server-side robots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub i64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player-{}", self.0)
    }
}

impl PlayerId {
    pub fn is_robot(self) -> bool {
        self.0 < 0
    }
}

/// A room id, assigned by the room manager. `RoomId(0)` denotes the lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub i64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "room-{}", self.0)
    }
}

impl RoomId {
    pub const LOBBY: RoomId = RoomId(0);

    pub fn is_lobby(self) -> bool {
        self.0 == 0
    }
}

bitflags::bitflags! {
    /// The `type` field of a packet. Exactly one of REQUEST/REPLY/NOTIFICATION
    /// is set, ORed with the source and destination bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PacketType: u8 {
        const REQUEST      = 0x01;
        const REPLY        = 0x02;
        const NOTIFICATION = 0x04;
        const SRC_CLIENT    = 0x10;
        const SRC_SERVER    = 0x20;
        const DEST_CLIENT   = 0x40;
        const DEST_SERVER   = 0x80;
    }
}

impl PacketType {
    pub fn is_request(self) -> bool {
        self.contains(PacketType::REQUEST)
    }

    pub fn is_reply(self) -> bool {
        self.contains(PacketType::REPLY)
    }

    pub fn is_notification(self) -> bool {
        self.contains(PacketType::NOTIFICATION)
    }

    pub fn server_to_client_notify() -> Self {
        PacketType::NOTIFICATION | PacketType::SRC_SERVER | PacketType::DEST_CLIENT
    }

    pub fn server_to_client_request() -> Self {
        PacketType::REQUEST | PacketType::SRC_SERVER | PacketType::DEST_CLIENT
    }

    pub fn client_to_server_reply() -> Self {
        PacketType::REPLY | PacketType::SRC_CLIENT | PacketType::DEST_SERVER
    }
}

/// `requestId = -2` marks a notification; `-1` marks an unsolicited push
/// that doesn't expect a reply; any positive value is a request id.
pub const REQUEST_ID_NOTIFICATION: i64 = -2;
pub const REQUEST_ID_UNSOLICITED: i64 = -1;

/// Request ids wrap before they'd overflow a reasonably-sized integer on
/// either end of the wire; matches the router's allocation scheme.
pub const REQUEST_ID_WRAP: i64 = 10_000_000;

/// A decoded packet body. Requests additionally carry `timeout` and
/// `timestamp`; replies and notifications carry neither, so those two
/// fields are `None` for the four-element wire form.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub request_id: i64,
    pub packet_type: PacketType,
    pub command: String,
    pub data: Vec<u8>,
    pub timeout: Option<i64>,
    pub timestamp: Option<i64>,
}

impl Packet {
    pub fn notify(command: impl Into<String>, data: Vec<u8>) -> Self {
        Packet {
            request_id: REQUEST_ID_NOTIFICATION,
            packet_type: PacketType::server_to_client_notify(),
            command: command.into(),
            data,
            timeout: None,
            timestamp: None,
        }
    }

    pub fn request(
        request_id: i64,
        command: impl Into<String>,
        data: Vec<u8>,
        timeout: i64,
        timestamp: i64,
    ) -> Self {
        Packet {
            request_id,
            packet_type: PacketType::server_to_client_request(),
            command: command.into(),
            data,
            timeout: Some(timeout),
            timestamp: Some(timestamp),
        }
    }

    pub fn reply(request_id: i64, command: impl Into<String>, data: Vec<u8>) -> Self {
        Packet {
            request_id,
            packet_type: PacketType::client_to_server_reply(),
            command: command.into(),
            data,
            timeout: None,
            timestamp: None,
        }
    }
}
