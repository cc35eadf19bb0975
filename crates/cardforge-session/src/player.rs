//! The player record: identity, connection state, and per-account stats.

use std::sync::Arc;

use cardforge_protocol::{ConnId, PlayerId, Router, RoomId};

/// §3's Player state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Freshly constructed, not yet placed anywhere.
    Invalid,
    /// Connected and idle (lobby or unstarted room).
    Online,
    /// Connected but has handed control to the AI for the remainder of
    /// the current game (player chose, or was defaulted into, auto-play).
    Trust,
    /// A room's game is actively running and this player is a participant.
    Run,
    /// Mid-game, but the player has asked to leave / forfeit.
    Leave,
    /// A server-controlled AI occupying a player seat; has no socket.
    Robot,
    /// Disconnected mid-game; the record is kept alive for reconnection.
    Offline,
}

/// Heartbeat credit ceiling (§4.11, P6): a silent client is kicked after
/// `max_ttl` missed heartbeat intervals.
pub const MAX_TTL: i32 = 6;

/// A connected (or recently-disconnected) player.
pub struct Player {
    pub id: PlayerId,
    pub conn_id: ConnId,
    pub screen_name: String,
    pub avatar: String,
    pub uuid: String,
    pub state: PlayerState,
    pub ready: bool,
    pub died: bool,
    pub runned: bool,
    pub room_id: RoomId,
    pub ttl: i32,
    pub total_game_time: u64,
    pub total_games: u64,
    pub win_count: u64,
    pub run_count: u64,
    pub last_game_mode: String,
    /// `None` for robots, which never own a socket.
    pub router: Option<Arc<Router>>,
}

impl Player {
    pub fn new_human(id: PlayerId, conn_id: ConnId, screen_name: String, uuid: String, router: Arc<Router>) -> Self {
        Player {
            id,
            conn_id,
            screen_name,
            avatar: "liubei".to_string(),
            uuid,
            state: PlayerState::Online,
            ready: false,
            died: false,
            runned: false,
            room_id: RoomId::LOBBY,
            ttl: MAX_TTL,
            total_game_time: 0,
            total_games: 0,
            win_count: 0,
            run_count: 0,
            last_game_mode: String::new(),
            router: Some(router),
        }
    }

    pub fn new_robot(id: PlayerId, room_id: RoomId, conn_id: ConnId) -> Self {
        Player {
            id,
            conn_id,
            screen_name: format!("Robot-{}", id.0.unsigned_abs()),
            avatar: "caocao".to_string(),
            uuid: String::new(),
            state: PlayerState::Robot,
            ready: true,
            died: false,
            runned: false,
            room_id,
            ttl: MAX_TTL,
            total_game_time: 0,
            total_games: 0,
            win_count: 0,
            run_count: 0,
            last_game_mode: String::new(),
            router: None,
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self.state, PlayerState::Online | PlayerState::Trust | PlayerState::Run | PlayerState::Robot)
    }

    pub fn inside_game(&self) -> bool {
        matches!(self.state, PlayerState::Trust | PlayerState::Run | PlayerState::Leave | PlayerState::Offline)
            && !self.room_id.is_lobby()
    }

    /// Credits a heartbeat reply, resetting the kick countdown.
    pub fn reset_ttl(&mut self) {
        self.ttl = MAX_TTL;
    }

    /// Decrements the kick countdown; returns true if the player should
    /// now be kicked for silence.
    pub fn tick_heartbeat(&mut self) -> bool {
        self.ttl -= 1;
        self.ttl <= 0
    }
}
