//! The server facade: the singleton that owns every shared registry and
//! answers the script engine's RPC calls (§4.9, §4.11).

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tokio::sync::{oneshot, Mutex, RwLock};

use cardforge_persist::{AuthDb, DbWorker};
use cardforge_persist::hygiene::to_hex_literal;
use cardforge_protocol::{ConnId, PlayerId, RoomId, RouterWait};
use cardforge_room::{ChatStore, MuteStatus, RoomManager, RoomState, StatsStore};
use cardforge_session::{AuthManager, UserManager};
use cardforge_worker::{EngineCall, EngineHost, EngineReply, ThreadPool};

use crate::config::ServerConfig;
use crate::stores::{SqlAccountStore, SqlChatStore, SqlStatsStore};

/// The literal outdated-content toast (§8 scenario 6): a `GameLog`
/// notification whose message is `"#RoomOutdated"`, with `toast: true`.
const ROOM_OUTDATED_NOTIFY: &[u8] = &[
    0xA2, 0x44, 0x74, 0x79, 0x70, 0x65, 0x4D, 0x23, 0x52, 0x6F, 0x6F, 0x6D, 0x4F, 0x75, 0x74, 0x64,
    0x61, 0x74, 0x65, 0x64, 0x45, 0x74, 0x6F, 0x61, 0x73, 0x74, 0xF5,
];

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Every piece of shared state a connection handler or the heartbeat/
/// refresh loops needs. One instance lives for the life of the process,
/// installed into [`install`] at startup.
pub struct ServerState {
    pub users: Mutex<UserManager>,
    pub rooms: Mutex<RoomManager>,
    pub auth: AuthManager,
    pub account_store: SqlAccountStore,
    pub chat_store: SqlChatStore,
    pub stats_store: SqlStatsStore,
    pub threads: ThreadPool,
    pub config: RwLock<ServerConfig>,
    game_db: DbWorker,
    content_md5: RwLock<String>,
    conn_ips: Mutex<HashMap<ConnId, String>>,
    banned_ips: Mutex<HashMap<String, i64>>,
    kick_signals: Mutex<HashMap<ConnId, oneshot::Sender<()>>>,
    thinking_conns: Mutex<HashSet<ConnId>>,
}

static INSTANCE: OnceLock<Arc<ServerState>> = OnceLock::new();

/// Installs the process-wide server facade. Panics if called twice —
/// there is exactly one server per process.
pub fn install(state: Arc<ServerState>) {
    INSTANCE
        .set(state)
        .unwrap_or_else(|_| panic!("ServerState already installed"));
}

/// Returns the installed server facade. Panics if [`install`] hasn't run
/// yet — every connection handler and background loop runs after startup
/// has installed it.
pub fn get() -> Arc<ServerState> {
    INSTANCE.get().expect("ServerState not installed").clone()
}

impl ServerState {
    pub fn new(
        auth: AuthManager,
        auth_db: Arc<AuthDb>,
        game_db: DbWorker,
        config: ServerConfig,
        content_md5: String,
    ) -> Self {
        let mut disabled = HashSet::new();
        disabled.extend(config.disabled_features.iter().cloned());
        ServerState {
            users: Mutex::new(UserManager::new()),
            rooms: Mutex::new(RoomManager::new(disabled)),
            auth,
            account_store: SqlAccountStore::new(auth_db.clone()),
            chat_store: SqlChatStore::new(auth_db.clone()),
            stats_store: SqlStatsStore::new(auth_db, game_db.clone()),
            threads: ThreadPool::new(config.room_count_per_thread),
            config: RwLock::new(config),
            game_db,
            content_md5: RwLock::new(content_md5),
            conn_ips: Mutex::new(HashMap::new()),
            banned_ips: Mutex::new(HashMap::new()),
            kick_signals: Mutex::new(HashMap::new()),
            thinking_conns: Mutex::new(HashSet::new()),
        }
    }

    pub async fn content_md5(&self) -> String {
        self.content_md5.read().await.clone()
    }

    /// Registers the remote IP a connection was accepted from, so a later
    /// `temporarilyBan` can look it up by player id.
    pub async fn register_conn(&self, conn_id: ConnId, ip: String) -> oneshot::Receiver<()> {
        self.conn_ips.lock().await.insert(conn_id, ip);
        let (tx, rx) = oneshot::channel();
        self.kick_signals.lock().await.insert(conn_id, tx);
        rx
    }

    pub async fn unregister_conn(&self, conn_id: ConnId) {
        self.conn_ips.lock().await.remove(&conn_id);
        self.kick_signals.lock().await.remove(&conn_id);
        self.thinking_conns.lock().await.remove(&conn_id);
    }

    /// Fires the connection's kick signal, if it's still connected. The
    /// handler task is responsible for actually closing the socket when
    /// it observes the signal.
    pub async fn kick_conn(&self, conn_id: ConnId) {
        if let Some(tx) = self.kick_signals.lock().await.remove(&conn_id) {
            let _ = tx.send(());
        }
    }

    pub async fn is_ip_banned(&self, ip: &str) -> bool {
        let now = now_secs();
        let mut banned = self.banned_ips.lock().await;
        banned.retain(|_, expires_at| *expires_at > now);
        banned.contains_key(ip)
    }

    /// `temporarilyBan` (§4.11): bans the connecting IP for
    /// `tempBanTime` minutes and disconnects immediately.
    pub async fn temporarily_ban(&self, id: PlayerId) {
        let conn_id = {
            let users = self.users.lock().await;
            match users.find_player(id) {
                Some(player) => player.lock().await.conn_id,
                None => return,
            }
        };
        let ip = self.conn_ips.lock().await.get(&conn_id).cloned();
        if let Some(ip) = ip {
            let minutes = self.config.read().await.temp_ban_time as i64;
            self.banned_ips
                .lock()
                .await
                .insert(ip, now_secs() + minutes * 60);
        }
        self.kick_conn(conn_id).await;
    }

    /// `isMuted` (§4.11): delegates to the `tempmute` table, auto-clearing
    /// expired rows as a side effect of the lookup.
    pub async fn is_muted(&self, id: PlayerId) -> MuteStatus {
        self.chat_store.mute_status(id).await.unwrap_or(MuteStatus::None)
    }

    /// Runs forever on the main reactor: every 30s, ticks every online
    /// player's heartbeat countdown and kicks whoever ran out (§4.11).
    pub async fn heartbeat_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            let to_kick = self.users.lock().await.heartbeat_tick().await;
            for conn_id in to_kick {
                tracing::info!(%conn_id, "heartbeat expired, kicking");
                self.kick_conn(conn_id).await;
            }
        }
    }

    /// `refreshMd5` (§4.11): recomputes the content digest and, if it
    /// changed, kicks everyone out of outdated rooms and the lobby, flags
    /// outdated worker threads, and reaps idle ones.
    pub async fn refresh_md5(self: &Arc<Self>, packages_dir: &Path) {
        let fresh = hash_directory(packages_dir).unwrap_or_default();
        let changed = {
            let mut current = self.content_md5.write().await;
            if *current == fresh {
                false
            } else {
                *current = fresh.clone();
                true
            }
        };
        if !changed {
            return;
        }
        tracing::warn!(md5 = %fresh, "content package changed, refreshing");

        let users = self.users.lock().await;
        let rooms = self.rooms.lock().await;
        let room_ids = rooms.all_room_ids();

        // Broadcast the outdated toast to every started room, and kick
        // players sitting in unstarted outdated rooms plus the lobby.
        let mut started_conns = Vec::new();
        let mut to_kick: Vec<ConnId> = rooms.lobby().conns().to_vec();
        for room_id in room_ids {
            if let Some(room) = rooms.room(room_id) {
                let mut targets = room.players.clone();
                targets.extend(room.observers.iter().copied());
                if room.is_started() {
                    started_conns.extend(targets);
                } else {
                    to_kick.extend(targets);
                }
            }
        }
        for conn_id in &started_conns {
            if let Some(player) = users.find_by_conn(*conn_id) {
                let guard = player.lock().await;
                if let Some(router) = &guard.router {
                    let _ = router.notify("GameLog", ROOM_OUTDATED_NOTIFY.to_vec());
                }
            }
        }
        drop(rooms);
        drop(users);
        for conn_id in to_kick {
            self.kick_conn(conn_id).await;
        }

        self.threads.reap_outdated_idle(&fresh);
    }
}

/// A deterministic content digest over `packages_dir`'s entries: sorted
/// filenames and sizes fed through SHA-256, hex-encoded. The source's
/// literal MD5 isn't load-bearing here — only a stable identity that
/// changes when the content package does (§4.8 "outdated").
fn hash_directory(packages_dir: &Path) -> std::io::Result<String> {
    let mut entries: Vec<_> = std::fs::read_dir(packages_dir)?
        .filter_map(|e| e.ok())
        .map(|e| (e.file_name().to_string_lossy().into_owned(), e.metadata().map(|m| m.len()).unwrap_or(0)))
        .collect();
    entries.sort();

    let mut hasher = Sha256::new();
    for (name, len) in entries {
        hasher.update(name.as_bytes());
        hasher.update(len.to_le_bytes());
    }
    Ok(hex::encode(hasher.finalize()))
}

impl EngineHost for ServerState {
    async fn dispatch(&self, call: EngineCall) -> EngineReply {
        match call {
            EngineCall::QDebug(msg) => {
                tracing::debug!(%msg, "engine");
                EngineReply::ok(Vec::new())
            }
            EngineCall::QInfo(msg) => {
                tracing::info!(%msg, "engine");
                EngineReply::ok(Vec::new())
            }
            EngineCall::QWarning(msg) => {
                tracing::warn!(%msg, "engine");
                EngineReply::ok(Vec::new())
            }
            EngineCall::QCritical(msg) => {
                tracing::error!(%msg, "engine");
                EngineReply::ok(Vec::new())
            }
            EngineCall::Print(msg) => {
                tracing::info!(%msg, "engine print");
                EngineReply::ok(Vec::new())
            }

            EngineCall::DoRequest { conn_id, command, payload, timeout_secs, .. } => {
                let router = self.router_for(conn_id).await;
                let Some(router) = router else { return EngineReply::err() };
                match router.request(command, payload, Duration::from_secs(timeout_secs.max(0) as u64)).await {
                    Ok(RouterWait::Reply(bytes)) => EngineReply::ok(bytes),
                    Ok(_) | Err(_) => EngineReply::err(),
                }
            }
            EngineCall::WaitForReply { conn_id, timeout_secs } => {
                // The real scheduler resumes a coroutine that's already
                // inside `request()`'s await; here there's no separate
                // wait step to perform, so this just polls whether that
                // request has since settled.
                let router = self.router_for(conn_id).await;
                let Some(router) = router else { return EngineReply::err() };
                let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs.max(0) as u64);
                loop {
                    if !router.has_outstanding_request().await {
                        return EngineReply::ok(Vec::new());
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return EngineReply::err();
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
            EngineCall::DoNotify { conn_id, command, payload } => {
                let router = self.router_for(conn_id).await;
                match router {
                    Some(router) => match router.notify(command, payload) {
                        Ok(()) => EngineReply::ok(Vec::new()),
                        Err(_) => EngineReply::err(),
                    },
                    None => EngineReply::err(),
                }
            }
            EngineCall::Thinking { conn_id } => {
                let thinking = self.thinking_conns.lock().await.contains(&conn_id);
                EngineReply::ok(vec![thinking as u8])
            }
            EngineCall::SetThinking { conn_id, thinking } => {
                let mut set = self.thinking_conns.lock().await;
                if thinking {
                    set.insert(conn_id);
                } else {
                    set.remove(&conn_id);
                }
                EngineReply::ok(Vec::new())
            }
            EngineCall::SetDied { conn_id, died } => {
                if let Some(player) = self.users.lock().await.find_by_conn(conn_id) {
                    player.lock().await.died = died;
                    EngineReply::ok(Vec::new())
                } else {
                    EngineReply::err()
                }
            }
            EngineCall::EmitKick { conn_id } => {
                self.kick_conn(conn_id).await;
                EngineReply::ok(Vec::new())
            }
            EngineCall::SaveState { conn_id, json } => {
                let Some((uid, mode)) = self.player_and_mode(conn_id).await else {
                    return EngineReply::err();
                };
                let literal = to_hex_literal(&json);
                match self
                    .game_db
                    .async_exec(format!(
                        "INSERT OR REPLACE INTO gameSaves (uid, mode, data) VALUES ({}, '{mode}', {literal})",
                        uid.0
                    ))
                    .await
                {
                    Ok(_) => EngineReply::ok(Vec::new()),
                    Err(_) => EngineReply::err(),
                }
            }
            EngineCall::GetSaveState { conn_id } => {
                let Some((uid, mode)) = self.player_and_mode(conn_id).await else {
                    return EngineReply::err();
                };
                match self
                    .game_db
                    .async_select(format!("SELECT data FROM gameSaves WHERE uid = {} AND mode = '{mode}'", uid.0))
                    .await
                {
                    Ok(rows) => {
                        let data = rows
                            .first()
                            .and_then(|r| r.first())
                            .and_then(|v| v.as_blob())
                            .map(|b| b.to_vec())
                            .unwrap_or_else(|| b"{}".to_vec());
                        EngineReply::ok(data)
                    }
                    Err(_) => EngineReply::err(),
                }
            }
            EngineCall::SaveGlobalState { conn_id, key, json } => {
                let Some(player) = self.users.lock().await.find_by_conn(conn_id) else {
                    return EngineReply::err();
                };
                let uid = player.lock().await.id;
                match self.stats_store_save(uid, &key, &json).await {
                    Ok(()) => EngineReply::ok(Vec::new()),
                    Err(_) => EngineReply::err(),
                }
            }
            EngineCall::GetGlobalSaveState { conn_id, key } => {
                let Some(player) = self.users.lock().await.find_by_conn(conn_id) else {
                    return EngineReply::err();
                };
                let uid = player.lock().await.id;
                match self.stats_store_load(uid, &key).await {
                    Ok(bytes) => EngineReply::ok(bytes),
                    Err(_) => EngineReply::err(),
                }
            }

            EngineCall::Delay { millis, .. } => {
                tokio::time::sleep(Duration::from_millis(millis)).await;
                EngineReply::ok(Vec::new())
            }
            EngineCall::UpdatePlayerWinRate { player_id, mode, result, .. } => {
                match self.stats_store.record_player_result(player_id, &mode, result == 1, false).await {
                    Ok(()) => EngineReply::ok(Vec::new()),
                    Err(_) => EngineReply::err(),
                }
            }
            EngineCall::UpdateGeneralWinRate { general, mode, role, result, .. } => {
                match self.stats_store.record_general_result(&general, &mode, &role, result == 1).await {
                    Ok(()) => EngineReply::ok(Vec::new()),
                    Err(_) => EngineReply::err(),
                }
            }
            EngineCall::GameOver { room_id } => {
                if let Some(room) = self.rooms.lock().await.room_mut(room_id) {
                    room.state = RoomState::Ending;
                    EngineReply::ok(Vec::new())
                } else {
                    EngineReply::err()
                }
            }
            EngineCall::SetRequestTimer { room_id, millis } => {
                let mut rooms = self.rooms.lock().await;
                let Some(room) = rooms.room_mut(room_id) else { return EngineReply::err() };
                let (tx, _rx) = oneshot::channel();
                room.arm_request_timer(Duration::from_millis(millis), tx);
                EngineReply::ok(Vec::new())
            }
            EngineCall::DestroyRequestTimer { room_id } => {
                if let Some(room) = self.rooms.lock().await.room_mut(room_id) {
                    room.cancel_request_timer();
                    EngineReply::ok(Vec::new())
                } else {
                    EngineReply::err()
                }
            }
            EngineCall::DecreaseRefCount { room_id } => {
                let rooms = self.rooms.lock().await;
                match rooms.room(room_id) {
                    Some(room) => {
                        room.decrease_ref_count().await;
                        EngineReply::ok(Vec::new())
                    }
                    None => EngineReply::err(),
                }
            }
            EngineCall::GetSessionId { room_id } => {
                match self.rooms.lock().await.room(room_id) {
                    Some(room) => EngineReply::ok(room.session_id.to_le_bytes().to_vec()),
                    None => EngineReply::err(),
                }
            }
            EngineCall::GetSessionData { room_id } => {
                match self.rooms.lock().await.room(room_id) {
                    Some(room) => EngineReply::ok(room.session_data.clone().into_bytes()),
                    None => EngineReply::err(),
                }
            }
            EngineCall::SetSessionData { room_id, json } => {
                if let Some(room) = self.rooms.lock().await.room_mut(room_id) {
                    room.session_data = String::from_utf8_lossy(&json).into_owned();
                    EngineReply::ok(Vec::new())
                } else {
                    EngineReply::err()
                }
            }
            EngineCall::AddNpc { room_id } => {
                let mut users = self.users.lock().await;
                let robot = users.create_robot(room_id);
                let conn_id = robot.lock().await.conn_id;
                drop(users);
                let mut rooms = self.rooms.lock().await;
                match rooms.room_mut(room_id) {
                    Some(room) => match room.join(conn_id, "") {
                        Ok(()) => EngineReply::ok(Vec::new()),
                        Err(_) => EngineReply::err(),
                    },
                    None => EngineReply::err(),
                }
            }
            EngineCall::RemoveNpc { room_id, player_id } => {
                let conn_id = match self.users.lock().await.find_player(player_id) {
                    Some(player) => player.lock().await.conn_id,
                    None => return EngineReply::err(),
                };
                if let Some(room) = self.rooms.lock().await.room_mut(room_id) {
                    room.leave(conn_id);
                    EngineReply::ok(Vec::new())
                } else {
                    EngineReply::err()
                }
            }
            EngineCall::RoomSaveGlobalState { room_id, key, json } => {
                let namespaced = format!("room:{}:{key}", room_id.0);
                match self.stats_store.save_global_state(&namespaced, &json).await {
                    Ok(()) => EngineReply::ok(Vec::new()),
                    Err(_) => EngineReply::err(),
                }
            }
            EngineCall::RoomGetGlobalState { room_id, key } => {
                let namespaced = format!("room:{}:{key}", room_id.0);
                match self.stats_store.load_global_state(&namespaced).await {
                    Ok(bytes) => EngineReply::ok(bytes),
                    Err(_) => EngineReply::err(),
                }
            }
            EngineCall::GetRoom { room_id } => match self.rooms.lock().await.room(room_id) {
                Some(room) => {
                    let summary = serde_json::json!({
                        "id": room_id.0,
                        "sessionId": room.session_id,
                        "players": room.players.iter().map(|c| c.0).collect::<Vec<_>>(),
                    });
                    EngineReply::ok(serde_json::to_vec(&summary).unwrap_or_default())
                }
                None => EngineReply::err(),
            },
        }
    }
}

impl ServerState {
    async fn router_for(&self, conn_id: ConnId) -> Option<Arc<cardforge_protocol::Router>> {
        let player = self.users.lock().await.find_by_conn(conn_id)?;
        let guard = player.lock().await;
        guard.router.clone()
    }

    async fn player_and_mode(&self, conn_id: ConnId) -> Option<(PlayerId, String)> {
        let player = self.users.lock().await.find_by_conn(conn_id)?;
        let guard = player.lock().await;
        let room_id = guard.room_id;
        let uid = guard.id;
        drop(guard);
        let mode = self
            .rooms
            .lock()
            .await
            .room(room_id)
            .map(|r| r.settings.game_mode.clone())
            .unwrap_or_default();
        Some((uid, mode))
    }

    async fn stats_store_save(&self, uid: PlayerId, key: &str, data: &[u8]) -> Result<(), cardforge_room::RoomError> {
        let namespaced = format!("player:{}:{key}", uid.0);
        self.stats_store.save_global_state(&namespaced, data).await
    }

    async fn stats_store_load(&self, uid: PlayerId, key: &str) -> Result<Vec<u8>, cardforge_room::RoomError> {
        let namespaced = format!("player:{}:{key}", uid.0);
        self.stats_store.load_global_state(&namespaced).await
    }
}
