//! The RPC surface between the server and the external script engine
//! (§4.9). The script engine itself is out-of-scope — it is reached
//! through a pipe transport this crate doesn't implement — so the two
//! directions of the protocol are each expressed as their own seam:
//!
//! - [`ScriptEngine`]: the handful of methods the *server* calls *on* the
//!   engine (the scheduler-implemented group: `HandleRequest`,
//!   `ResumeRoom`, `SetPlayerState`, `AddObserver`, `RemoveObserver`).
//!   [`ScriptEngineProcess`] would speak this over the real pipe;
//!   [`NullScriptEngine`] is the always-available test double.
//! - [`EngineHost`]: the much larger group the engine calls *on* the
//!   server (logging, per-player requests, per-room bookkeeping). Encoded
//!   as a single [`EngineCall`] enum dispatched through one
//!   `async fn dispatch`, since every one of these calls shares the same
//!   `(ok, result)` reply shape on the wire.

use cardforge_protocol::{ConnId, PlayerId};

/// What every `EngineHost` call returns on the wire: `(ok, result)`.
#[derive(Debug, Clone, Default)]
pub struct EngineReply {
    pub ok: bool,
    pub result: Vec<u8>,
}

impl EngineReply {
    pub fn ok(result: Vec<u8>) -> Self {
        EngineReply { ok: true, result }
    }

    pub fn err() -> Self {
        EngineReply { ok: false, result: Vec::new() }
    }
}

/// The methods the script engine calls on the server (§4.9 "Logging",
/// "Player", "Room", "RoomThread" groups). One variant per RPC method;
/// grouped in the same order the spec lists them.
#[derive(Debug, Clone)]
pub enum EngineCall {
    // --- Logging ---
    QDebug(String),
    QInfo(String),
    QWarning(String),
    QCritical(String),
    Print(String),

    // --- Player ---
    DoRequest { conn_id: ConnId, command: String, payload: Vec<u8>, timeout_secs: i64, timestamp: i64 },
    WaitForReply { conn_id: ConnId, timeout_secs: i64 },
    DoNotify { conn_id: ConnId, command: String, payload: Vec<u8> },
    Thinking { conn_id: ConnId },
    SetThinking { conn_id: ConnId, thinking: bool },
    SetDied { conn_id: ConnId, died: bool },
    EmitKick { conn_id: ConnId },
    SaveState { conn_id: ConnId, json: Vec<u8> },
    GetSaveState { conn_id: ConnId },
    SaveGlobalState { conn_id: ConnId, key: String, json: Vec<u8> },
    GetGlobalSaveState { conn_id: ConnId, key: String },

    // --- Room ---
    Delay { room_id: cardforge_protocol::RoomId, millis: u64 },
    UpdatePlayerWinRate { room_id: cardforge_protocol::RoomId, player_id: PlayerId, mode: String, role: String, result: i32 },
    UpdateGeneralWinRate { room_id: cardforge_protocol::RoomId, general: String, mode: String, role: String, result: i32 },
    GameOver { room_id: cardforge_protocol::RoomId },
    SetRequestTimer { room_id: cardforge_protocol::RoomId, millis: u64 },
    DestroyRequestTimer { room_id: cardforge_protocol::RoomId },
    DecreaseRefCount { room_id: cardforge_protocol::RoomId },
    GetSessionId { room_id: cardforge_protocol::RoomId },
    GetSessionData { room_id: cardforge_protocol::RoomId },
    SetSessionData { room_id: cardforge_protocol::RoomId, json: Vec<u8> },
    AddNpc { room_id: cardforge_protocol::RoomId },
    RemoveNpc { room_id: cardforge_protocol::RoomId, player_id: PlayerId },
    RoomSaveGlobalState { room_id: cardforge_protocol::RoomId, key: String, json: Vec<u8> },
    RoomGetGlobalState { room_id: cardforge_protocol::RoomId, key: String },

    // --- RoomThread ---
    GetRoom { room_id: cardforge_protocol::RoomId },
}

/// Implemented by whatever owns the player/room registries (the server
/// facade) to answer calls the script engine makes into the server. Kept
/// as a single `dispatch` entry point rather than one trait method per
/// RPC method, since every call shares the same `(ok, result)` shape and
/// a `match` on [`EngineCall`] reads closer to the source's single RPC
/// handler than forty near-identical trait methods would.
pub trait EngineHost: Send + Sync + 'static {
    async fn dispatch(&self, call: EngineCall) -> EngineReply;
}

/// Outcome of `ResumeRoom`: whether the scheduler still holds the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomLiveness {
    StillLive,
    Dropped,
}

/// The methods the server calls on the script engine (§4.9 "Scheduler-
/// implemented methods").
pub trait ScriptEngine: Send + Sync + 'static {
    async fn handle_request(&self, request_json: Vec<u8>) -> EngineReply;
    async fn resume_room(&self, room_id: cardforge_protocol::RoomId, reason: &str) -> RoomLiveness;
    async fn set_player_state(&self, room_id: cardforge_protocol::RoomId, player_id: PlayerId, state: &str);
    async fn add_observer(&self, room_id: cardforge_protocol::RoomId, player_object: Vec<u8>);
    async fn remove_observer(&self, room_id: cardforge_protocol::RoomId, player_id: PlayerId);
}

/// Always-available test double: answers every call with a canned
/// not-ready reply and reports every room as dropped. Used wherever a
/// `ScriptEngine` is required but no real script engine process is
/// running (unit tests, a server started without content packages).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullScriptEngine;

impl ScriptEngine for NullScriptEngine {
    async fn handle_request(&self, _request_json: Vec<u8>) -> EngineReply {
        EngineReply::err()
    }

    async fn resume_room(&self, _room_id: cardforge_protocol::RoomId, _reason: &str) -> RoomLiveness {
        RoomLiveness::Dropped
    }

    async fn set_player_state(&self, _room_id: cardforge_protocol::RoomId, _player_id: PlayerId, _state: &str) {}

    async fn add_observer(&self, _room_id: cardforge_protocol::RoomId, _player_object: Vec<u8>) {}

    async fn remove_observer(&self, _room_id: cardforge_protocol::RoomId, _player_id: PlayerId) {}
}
