//! The room manager: owns the [`Lobby`] plus every active [`Room`], and is
//! the single entry point the main reactor calls into for lobby/room
//! packets (§4.6, §4.7). Like the player registry, it is mutated only from
//! the main reactor (§5) — never from a worker thread.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};

use cardforge_protocol::{ConnId, PlayerId, RoomId};
use cardforge_session::UserManager;

use crate::base::RoomBase;
use crate::chat::{self, ChatMessage, ChatScope, ChatStore, MuteStatus};
use crate::error::RoomError;
use crate::lobby::{Lobby, RoomListing};
use crate::room::Room;
use crate::settings::{clamp_capacity, parse_settings};

/// Feature names gatable via `disabledFeatures` (§3 legacy compatibility
/// shim folds `enableBots`/`enableChangeRoom` into these at config load).
pub const FEATURE_ADD_ROBOT: &str = "AddRobot";
pub const FEATURE_CHANGE_ROOM: &str = "ChangeRoom";

pub struct RoomManager {
    lobby: Lobby,
    rooms: HashMap<RoomId, Room>,
    conn_room: HashMap<ConnId, RoomId>,
    next_room_id: AtomicI64,
    disabled_features: HashSet<String>,
}

impl RoomManager {
    pub fn new(disabled_features: HashSet<String>) -> Self {
        RoomManager {
            lobby: Lobby::new(),
            rooms: HashMap::new(),
            conn_room: HashMap::new(),
            next_room_id: AtomicI64::new(1),
            disabled_features,
        }
    }

    pub fn lobby(&self) -> &Lobby {
        &self.lobby
    }

    pub fn room(&self, room_id: RoomId) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    pub fn room_mut(&mut self, room_id: RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(&room_id)
    }

    /// Every room id, started or not. Unlike [`RoomManager::refresh_room_list`],
    /// which only lists rooms a client may join, this reaches rooms already
    /// in play (§4.11 `refreshMd5` must notify those too).
    pub fn all_room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().copied().collect()
    }

    /// Which room (possibly the lobby) a connection currently sits in.
    pub fn location_of(&self, conn_id: ConnId) -> RoomId {
        self.conn_room.get(&conn_id).copied().unwrap_or(RoomId::LOBBY)
    }

    fn feature_disabled(&self, feature: &str) -> bool {
        self.disabled_features.contains(feature)
    }

    /// A freshly-connected player always starts in the lobby.
    pub fn place_in_lobby(&mut self, conn_id: ConnId) {
        self.lobby.enter(conn_id);
        self.conn_room.insert(conn_id, RoomId::LOBBY);
    }

    /// `CreateRoom` (§4.6): parses `[name, capacity, timeout, settings]`,
    /// allocates a room id, and seats the owner. Worker-thread assignment
    /// (`Server::getAvailableThread`) is the caller's job — this only
    /// leaves `Room.thread_id` unset for it to fill in.
    pub fn create_room(
        &mut self,
        owner: ConnId,
        name: String,
        requested_capacity: i64,
        timeout: u32,
        settings_raw: Vec<u8>,
    ) -> Result<RoomId, RoomError> {
        let settings = parse_settings(settings_raw)?;
        let capacity = clamp_capacity(requested_capacity);
        let room_id = RoomId(self.next_room_id.fetch_add(1, Ordering::Relaxed));

        self.lobby.leave(owner);
        self.conn_room.insert(owner, room_id);
        self.rooms.insert(room_id, Room::new(room_id, name, capacity, owner, settings, timeout));
        tracing::info!(%room_id, owner = %owner, "room created");
        Ok(room_id)
    }

    /// `EnterRoom` (§4.6): rejects on full/started/password mismatch/
    /// previously-kicked before joining.
    pub fn enter_room(&mut self, conn_id: ConnId, room_id: RoomId, password_attempt: &str, account: PlayerId) -> Result<(), RoomError> {
        let room = self.rooms.get_mut(&room_id).ok_or(RoomError::NotFound(room_id))?;
        if room.rejected_players.contains(&account) {
            return Err(RoomError::NotFound(room_id));
        }
        room.join(conn_id, password_attempt)?;
        self.lobby.leave(conn_id);
        self.conn_room.insert(conn_id, room_id);
        Ok(())
    }

    /// `ObserveRoom` (§4.6): same gating as `EnterRoom`, but the connection
    /// lands in the observer list instead of the player list.
    pub fn observe_room(&mut self, conn_id: ConnId, room_id: RoomId, password_attempt: &str, account: PlayerId) -> Result<(), RoomError> {
        let room = self.rooms.get_mut(&room_id).ok_or(RoomError::NotFound(room_id))?;
        if room.rejected_players.contains(&account) {
            return Err(RoomError::NotFound(room_id));
        }
        if !room.settings.password_matches(password_attempt) {
            return Err(RoomError::PasswordMismatch);
        }
        room.observe(conn_id);
        self.lobby.leave(conn_id);
        self.conn_room.insert(conn_id, room_id);
        Ok(())
    }

    /// `QuitRoom`/leaving a room for any reason: moves the connection back
    /// to the lobby. Returns whether the room is now empty of humans, so
    /// the caller can decide whether to run `check_abandoned`.
    pub fn leave_room(&mut self, conn_id: ConnId) -> Option<RoomId> {
        let room_id = self.conn_room.get(&conn_id).copied()?;
        if room_id.is_lobby() {
            return None;
        }
        if let Some(room) = self.rooms.get_mut(&room_id) {
            room.leave(conn_id);
        }
        self.lobby.enter(conn_id);
        self.conn_room.insert(conn_id, RoomId::LOBBY);
        Some(room_id)
    }

    /// Erases a room once it has transitioned to `Abandoned`.
    pub fn destroy_room(&mut self, room_id: RoomId) -> Option<Room> {
        let room = self.rooms.remove(&room_id)?;
        self.conn_room.retain(|_, rid| *rid != room_id);
        tracing::info!(%room_id, "room destroyed");
        Some(room)
    }

    /// `ChangeRoom` (§4.7): leave the current room and fall back to the
    /// lobby to be re-assigned, unless the feature is disabled.
    pub fn change_room(&mut self, conn_id: ConnId) -> Result<(), RoomError> {
        if self.feature_disabled(FEATURE_CHANGE_ROOM) {
            return Err(RoomError::FeatureDisabled(FEATURE_CHANGE_ROOM.to_string()));
        }
        self.leave_room(conn_id);
        Ok(())
    }

    /// `KickPlayer` (§4.7): owner only.
    pub fn kick_player(&mut self, room_id: RoomId, requester: ConnId, target: ConnId, target_account: PlayerId) -> Result<(), RoomError> {
        let room = self.rooms.get_mut(&room_id).ok_or(RoomError::NotFound(room_id))?;
        room.kick(requester, target, target_account)?;
        self.lobby.enter(target);
        self.conn_room.insert(target, RoomId::LOBBY);
        Ok(())
    }

    /// `AddRobotRequest` (§4.7): owner only, gated on the `AddRobot`
    /// feature. Allocating the robot's player record is the caller's job
    /// (via [`UserManager::create_robot`]); this only seats it.
    pub fn add_robot(&mut self, room_id: RoomId, requester: ConnId, robot_conn: ConnId) -> Result<(), RoomError> {
        if self.feature_disabled(FEATURE_ADD_ROBOT) {
            return Err(RoomError::FeatureDisabled(FEATURE_ADD_ROBOT.to_string()));
        }
        let room = self.rooms.get_mut(&room_id).ok_or(RoomError::NotFound(room_id))?;
        room.require_owner(requester)?;
        room.join(robot_conn, "")?;
        self.conn_room.insert(robot_conn, room_id);
        Ok(())
    }

    /// `Ready` (§4.7): toggles readiness for the sender.
    pub fn toggle_ready(&mut self, room_id: RoomId, conn_id: ConnId) -> Result<bool, RoomError> {
        let room = self.rooms.get_mut(&room_id).ok_or(RoomError::NotFound(room_id))?;
        Ok(room.toggle_ready(conn_id))
    }

    /// `StartGame` (§4.7): owner only; `force` mirrors the owner-forced
    /// start path that bypasses the all-ready/at-capacity checks.
    pub fn start_game(&mut self, room_id: RoomId, requester: ConnId, content_md5: &str, force: bool) -> Result<(), RoomError> {
        let room = self.rooms.get_mut(&room_id).ok_or(RoomError::NotFound(room_id))?;
        room.start(requester, content_md5, force)
    }

    /// `RefreshRoomList` (§4.6): only rooms that are still joinable (not
    /// started, not full) are listed.
    pub async fn refresh_room_list(&self, users: &UserManager) -> Vec<RoomListing> {
        let mut listings = Vec::new();
        for r in self.rooms.values().filter(|r| !r.is_started()) {
            let owner_name = match users.find_by_conn(r.owner) {
                Some(player) => player.lock().await.screen_name.clone(),
                None => String::new(),
            };
            listings.push(RoomListing {
                id: r.id(),
                name: r.name.clone(),
                owner_name,
                game_mode: r.settings.game_mode.clone(),
                player_count: r.players.len() as u32,
                capacity: r.capacity,
                locked: r.is_locked(),
                started: r.is_started(),
            });
        }
        listings
    }

    /// The literal `"<playerId>,<connId>,<command>,<payload>"` line a
    /// Running room's unrecognized commands are forwarded to the assigned
    /// worker thread's scheduler as (§4.7).
    pub fn format_worker_request(player_id: PlayerId, conn_id: ConnId, command: &str, payload: &str) -> String {
        format!("{},{},{},{}", player_id.0, conn_id.0, command, payload)
    }

    /// `RoomBase::chat` (§4.7 "Chat"): decode, filter, and broadcast. The
    /// scope (`type==1` lobby vs `type==2` room) must match where the
    /// sender actually is.
    pub async fn chat(
        &self,
        sender: PlayerId,
        sender_conn: ConnId,
        data: &[u8],
        ban_words: &[String],
        chat_store: &impl ChatStore,
        users: &UserManager,
    ) -> Result<(), RoomError> {
        let chat = chat::decode_chat(sender, data)?;
        let location = self.location_of(sender_conn);
        match (chat.scope, location.is_lobby()) {
            (ChatScope::Lobby, true) => {}
            (ChatScope::Room, false) => {}
            _ => return Err(RoomError::ChatRejected),
        }

        let mute = chat_store.mute_status(sender).await?;
        if !chat::should_broadcast(&chat, ban_words, mute) {
            tracing::info!(sender = %sender, "chat message rejected");
            return Ok(());
        }
        tracing::info!(sender = %sender, msg = %chat.msg, "chat");

        match chat.scope {
            ChatScope::Lobby => {
                RoomBase::new(RoomId::LOBBY)
                    .broadcast_notify(users, self.lobby.conns(), "Chat", chat_payload(&chat))
                    .await;
            }
            ChatScope::Room => {
                let room = self.rooms.get(&location).ok_or(RoomError::NotFound(location))?;
                let mut targets = room.players.clone();
                targets.extend(room.observers.iter().copied());
                RoomBase::new(location).broadcast_notify(users, &targets, "Chat", chat_payload(&chat)).await;
            }
        }
        Ok(())
    }
}

fn chat_payload(chat: &ChatMessage) -> Vec<u8> {
    let mut buf = Vec::new();
    let map = ciborium::Value::Map(vec![
        (ciborium::Value::Text("sender".into()), ciborium::Value::Integer(chat.sender.0.into())),
        (ciborium::Value::Text("msg".into()), ciborium::Value::Text(chat.msg.clone())),
    ]);
    ciborium::into_writer(&map, &mut buf).expect("chat payload always encodes");
    buf
}

/// Reduces `MuteStatus` boilerplate for callers that only need to know
/// whether a player can send anything at all right now.
pub fn is_fully_muted(status: MuteStatus) -> bool {
    matches!(status, MuteStatus::Full)
}
