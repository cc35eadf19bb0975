//! The lobby: the one always-present "room" every connection starts in
//! (§3 `RoomId::LOBBY`, §4.6).

use cardforge_protocol::{ConnId, RoomId};

use crate::base::RoomBase;

/// Summary row for `RefreshRoomList` (§4.6): enough to render the room
/// browser without exposing the password itself.
#[derive(Debug, Clone)]
pub struct RoomListing {
    pub id: RoomId,
    pub name: String,
    pub owner_name: String,
    pub game_mode: String,
    pub player_count: u32,
    pub capacity: u32,
    pub locked: bool,
    pub started: bool,
}

/// The lobby holds every connection that isn't currently seated in a
/// room. `CreateRoom`/`EnterRoom`/`ObserveRoom` move a connection out of
/// here; leaving a room moves it back.
pub struct Lobby {
    base: RoomBase,
    conns: Vec<ConnId>,
}

impl Lobby {
    pub fn new() -> Self {
        Lobby { base: RoomBase::new(RoomId::LOBBY), conns: Vec::new() }
    }

    pub fn id(&self) -> RoomId {
        self.base.id
    }

    pub fn conns(&self) -> &[ConnId] {
        &self.conns
    }

    pub fn enter(&mut self, conn_id: ConnId) {
        if !self.conns.contains(&conn_id) {
            self.conns.push(conn_id);
        }
    }

    pub fn leave(&mut self, conn_id: ConnId) {
        self.conns.retain(|c| *c != conn_id);
    }

    pub fn contains(&self, conn_id: ConnId) -> bool {
        self.conns.contains(&conn_id)
    }
}

impl Default for Lobby {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_and_leave_track_membership() {
        let mut lobby = Lobby::new();
        lobby.enter(ConnId(1));
        assert!(lobby.contains(ConnId(1)));
        lobby.leave(ConnId(1));
        assert!(!lobby.contains(ConnId(1)));
    }

    #[test]
    fn enter_is_idempotent() {
        let mut lobby = Lobby::new();
        lobby.enter(ConnId(1));
        lobby.enter(ConnId(1));
        assert_eq!(lobby.conns().len(), 1);
    }
}
