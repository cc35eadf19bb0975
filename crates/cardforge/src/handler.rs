//! Per-connection handler: the public-key early packet, the Setup
//! handshake (§4.4), and the command dispatch loop that follows (§4.6
//! lobby surface, §4.7 room surface).
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_connection`]. A [`Router`] is created up front and wired to a
//! dedicated outbound-pump task: anything the dispatch loop or the room
//! layer enqueues onto it lands on the socket without blocking whichever
//! task produced it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use cardforge_persist::hygiene::is_safe_identifier;
use cardforge_protocol::{decode_packet, encode_packet, ConnId, Packet, PlayerId, RoomId, Router};
use cardforge_room::{RoomManager, RoomState};
use cardforge_session::{validate_setup, AdmitOutcome, PlayerState, SetupPolicy};
use cardforge_transport::{Connection, TcpConnection};
use cardforge_worker::{NullScriptEngine, ScriptEngine};

use crate::state::ServerState;

/// How long a freshly accepted socket has to send its Setup packet.
const SETUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Drop guard that tears down a player's session when the handler task
/// exits, however it exits (clean close, kick signal, panic). `Drop` is
/// synchronous, so cleanup runs as a fire-and-forget task — the same
/// shape this stack uses anywhere an async resource needs a sync
/// destructor.
struct SessionGuard {
    conn_id: ConnId,
    state: Arc<ServerState>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let left_room = state.rooms.lock().await.leave_room(conn_id);
            if let Some(room_id) = left_room {
                finish_abandon_check(&state, room_id).await;
            }
            state.users.lock().await.remove_conn(conn_id).await;
            state.unregister_conn(conn_id).await;
        });
    }
}

/// Accepts and runs one connection end-to-end: public key, Setup, then
/// the command loop. Never returns an error — every failure path is
/// logged and the connection closed, matching §7's "no unwind-based
/// control flow for expected failures".
pub async fn handle_connection(conn: Arc<TcpConnection>, peer_ip: String) {
    let state = crate::state::get();
    let conn_id = conn.id();

    if state.is_ip_banned(&peer_ip).await {
        tracing::debug!(%conn_id, ip = %peer_ip, "rejecting connection from banned ip");
        let _ = conn.close().await;
        return;
    }

    if let Err(e) = send_der_public_key(&conn, &state).await {
        tracing::warn!(%conn_id, error = %e, "failed to send public key, closing");
        let _ = conn.close().await;
        return;
    }

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Packet>();
    let router = Arc::new(Router::new(outbound_tx));
    let pump = tokio::spawn(run_outbound_pump(Arc::clone(&conn), outbound_rx));

    let mut kick_rx = state.register_conn(conn_id, peer_ip).await;

    let setup = tokio::select! {
        result = tokio::time::timeout(SETUP_TIMEOUT, perform_setup(&conn, &state, conn_id, Arc::clone(&router))) => result,
        _ = &mut kick_rx => Ok(None),
    };

    let Ok(Ok(Some((player_id, screen_name)))) = setup else {
        state.unregister_conn(conn_id).await;
        let _ = conn.close().await;
        pump.abort();
        return;
    };

    tracing::info!(%conn_id, %player_id, %screen_name, "player authenticated");
    let _guard = SessionGuard { conn_id, state: Arc::clone(&state) };

    let mut consecutive_failures: u8 = 0;
    loop {
        tokio::select! {
            _ = &mut kick_rx => {
                tracing::debug!(%conn_id, "kicked");
                break;
            }
            recv = conn.recv() => {
                match recv {
                    Ok(Some(bytes)) => {
                        if let Err(e) = dispatch_frame(&state, conn_id, player_id, &router, &bytes).await {
                            consecutive_failures += 1;
                            tracing::debug!(%conn_id, error = %e, consecutive_failures, "dropping malformed frame");
                            if consecutive_failures >= 3 {
                                tracing::warn!(%conn_id, "closing after 3 consecutive malformed frames");
                                break;
                            }
                        } else {
                            consecutive_failures = 0;
                        }
                    }
                    Ok(None) => {
                        tracing::info!(%conn_id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "recv error");
                        break;
                    }
                }
            }
        }
    }

    router.cancel().await;
    pump.abort();
    let _ = conn.close().await;
    // `_guard` drops here: room departure and registry cleanup fire.
}

/// Sends the RSA public key as an `InstallKey` early packet, ahead of the
/// Setup exchange (§4.4).
async fn send_der_public_key(conn: &TcpConnection, state: &ServerState) -> Result<(), crate::error::ServerError> {
    let der = state.auth.public_key_der()?;
    let bytes = encode_packet(&Packet::notify("InstallKey", der))?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Drains whatever the router enqueues and writes each packet to the
/// socket, so a slow client can't stall the dispatch loop that produced
/// the packet.
async fn run_outbound_pump(conn: Arc<TcpConnection>, mut rx: mpsc::UnboundedReceiver<Packet>) {
    while let Some(packet) = rx.recv().await {
        match encode_packet(&packet) {
            Ok(bytes) => {
                if conn.send(&bytes).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode outbound packet"),
        }
    }
}

/// Receives and validates the Setup packet (§4.4 steps 1–11). Returns
/// `Ok(None)` for any rejection already handled by sending an early
/// packet and logging; `Err` only for a transport failure while doing so.
async fn perform_setup(
    conn: &TcpConnection,
    state: &Arc<ServerState>,
    conn_id: ConnId,
    router: Arc<Router>,
) -> Result<Option<(PlayerId, String)>, crate::error::ServerError> {
    let raw = match conn.recv().await? {
        Some(bytes) => bytes,
        None => return Ok(None),
    };
    let packet = match decode_packet(&raw) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(%conn_id, error = %e, "malformed setup frame");
            return Ok(None);
        }
    };
    if packet.command != "Setup" {
        tracing::warn!(%conn_id, command = %packet.command, "expected Setup as the first packet");
        send_early(conn, "ErrorDlg", b"expected Setup".to_vec()).await?;
        return Ok(None);
    }

    let policy = {
        let config = state.config.read().await;
        SetupPolicy {
            ban_words: config.ban_words.clone(),
            whitelist_enabled: config.enable_whitelist,
            max_players_per_device: config.max_players_per_device,
            current_md5: state.content_md5().await,
        }
    };

    let (account, fields) = match validate_setup(&state.auth, &state.account_store, &policy, &packet.data).await {
        Ok(ok) => ok,
        Err(cardforge_session::AuthError::PackageOutdated) => {
            send_early(conn, "UpdatePackage", policy.current_md5.into_bytes()).await?;
            return Ok(None);
        }
        Err(e) => {
            tracing::warn!(%conn_id, error = %e, "setup rejected");
            send_early(conn, "ErrorDlg", e.to_string().into_bytes()).await?;
            return Ok(None);
        }
    };

    let (outcome, previous_conn) = {
        let mut users = state.users.lock().await;
        // `admit` rewires its bookkeeping onto `conn_id` before returning,
        // so the only chance to learn the previous connection is before
        // calling it.
        let previous_conn = match users.find_player(account.id) {
            Some(existing) => Some(existing.lock().await.conn_id),
            None => None,
        };
        let outcome = users.admit(&account, conn_id, fields.screen_name.clone(), fields.uuid.clone(), router).await;
        (outcome, previous_conn)
    };
    let player = match outcome {
        AdmitOutcome::Fresh(player) => player,
        AdmitOutcome::Reconnected(player) => player,
        AdmitOutcome::KickedPrevious(player) => {
            // The previous connection's handler task owns that socket; we
            // can only ask it to close via its kick signal.
            if let Some(previous_conn) = previous_conn {
                if previous_conn != conn_id {
                    state.kick_conn(previous_conn).await;
                }
            }
            player
        }
    };

    if let Err(e) = state.account_store.record_login(account.id, "").await {
        tracing::warn!(%conn_id, error = %e, "failed to record login");
    }

    state.rooms.lock().await.place_in_lobby(conn_id);

    let guard = player.lock().await;
    let setup_reply = cbor_array(&[
        CborField::Int(guard.id.0),
        CborField::Text(&guard.screen_name),
        CborField::Text(&guard.avatar),
        CborField::Int(guard.total_game_time as i64),
    ]);
    if let Some(router) = &guard.router {
        let _ = router.notify("Setup", setup_reply);
    }
    let screen_name = guard.screen_name.clone();
    Ok(Some((account.id, screen_name)))
}

/// Sends an early packet (before a [`Router`] exists to own replies) and
/// logs if the socket is already gone.
async fn send_early(conn: &TcpConnection, command: &str, data: Vec<u8>) -> Result<(), crate::error::ServerError> {
    let bytes = encode_packet(&Packet::notify(command, data))?;
    conn.send(&bytes).await?;
    Ok(())
}

/// One CBOR-encodable field, kept minimal since every payload this
/// handler builds is a short flat array or map.
enum CborField<'a> {
    Int(i64),
    Text(&'a str),
}

fn cbor_array(fields: &[CborField<'_>]) -> Vec<u8> {
    let values: Vec<ciborium::Value> = fields
        .iter()
        .map(|f| match f {
            CborField::Int(i) => ciborium::Value::Integer((*i).into()),
            CborField::Text(s) => ciborium::Value::Text((*s).to_string()),
        })
        .collect();
    let mut buf = Vec::new();
    ciborium::into_writer(&ciborium::Value::Array(values), &mut buf).expect("cbor array always encodes");
    buf
}

/// Decodes one wire frame and dispatches it: a reply is matched against
/// the router's outstanding request, anything else is a command.
async fn dispatch_frame(
    state: &Arc<ServerState>,
    conn_id: ConnId,
    player_id: PlayerId,
    router: &Arc<Router>,
    bytes: &[u8],
) -> Result<(), cardforge_protocol::WireError> {
    let packet = decode_packet(bytes)?;
    if packet.packet_type.is_reply() {
        router.accept_reply(&packet).await;
        return Ok(());
    }
    dispatch_command(state, conn_id, player_id, router, &packet.command, &packet.data).await;
    Ok(())
}

async fn dispatch_command(
    state: &Arc<ServerState>,
    conn_id: ConnId,
    player_id: PlayerId,
    router: &Arc<Router>,
    command: &str,
    data: &[u8],
) {
    match command {
        "Heartbeat" => {
            if let Some(player) = state.users.lock().await.find_by_conn(conn_id) {
                player.lock().await.reset_ttl();
            }
        }
        "Quit" => {
            state.kick_conn(conn_id).await;
        }
        "UpdateAvatar" => handle_update_avatar(state, conn_id, router, data).await,
        "UpdatePassword" => handle_update_password(state, conn_id, router, data).await,
        "CreateRoom" => handle_create_room(state, conn_id, router, data).await,
        "EnterRoom" => handle_enter_room(state, conn_id, player_id, router, data).await,
        "ObserveRoom" => handle_observe_room(state, conn_id, player_id, router, data).await,
        "RefreshRoomList" => handle_refresh_room_list(state, router).await,
        "Chat" => handle_chat(state, conn_id, player_id, router, data).await,
        "QuitRoom" => handle_quit_room(state, conn_id).await,
        "AddRobotRequest" => handle_add_robot(state, conn_id, router).await,
        "KickPlayer" => handle_kick_player(state, conn_id, router, data).await,
        "Ready" => handle_ready(state, conn_id).await,
        "StartGame" => handle_start_game(state, conn_id, router, data).await,
        "Trust" => handle_trust(state, conn_id).await,
        "ChangeRoom" => handle_change_room(state, conn_id, router).await,
        other => forward_or_ignore(state, conn_id, player_id, other, data).await,
    }
}

async fn reply_error(router: &Arc<Router>, command: &str, message: &str) {
    let _ = router.notify(command, message.as_bytes().to_vec());
}

async fn handle_update_avatar(state: &Arc<ServerState>, conn_id: ConnId, router: &Arc<Router>, data: &[u8]) {
    let avatar = match decode_single_text(data) {
        Some(s) if !s.is_empty() && is_safe_identifier(&s) => s,
        _ => return reply_error(router, "ErrorMsg", "invalid avatar").await,
    };
    let Some(player) = state.users.lock().await.find_by_conn(conn_id) else { return };
    let id = player.lock().await.id;
    match state.account_store.update_avatar(id, &avatar).await {
        Ok(()) => {
            player.lock().await.avatar = avatar.clone();
            let _ = router.notify("UpdateAvatar", avatar.into_bytes());
        }
        Err(e) => {
            tracing::warn!(error = %e, "update avatar failed");
            reply_error(router, "ErrorMsg", "avatar update failed").await;
        }
    }
}

async fn handle_update_password(state: &Arc<ServerState>, conn_id: ConnId, router: &Arc<Router>, data: &[u8]) {
    let Some((old_password, new_password)) = decode_two_texts(data) else {
        return reply_error(router, "ErrorMsg", "malformed password update").await;
    };
    let Some(player) = state.users.lock().await.find_by_conn(conn_id) else {
        return reply_error(router, "ErrorMsg", "not logged in").await;
    };
    let screen_name = player.lock().await.screen_name.clone();
    let Ok(Some(account)) = state.account_store.find_by_name(&screen_name).await else {
        return reply_error(router, "ErrorMsg", "account not found").await;
    };
    let expected = cardforge_session::auth::hash_password(&old_password, &account.salt);
    if expected != account.password_hash {
        return reply_error(router, "ErrorMsg", "wrong password").await;
    }
    let new_salt = cardforge_session::auth::generate_salt();
    let new_hash = cardforge_session::auth::hash_password(&new_password, &new_salt);
    match state.account_store.update_password(account.id, &new_hash, &new_salt).await {
        Ok(()) => {
            let _ = router.notify("UpdatePassword", Vec::new());
        }
        Err(e) => {
            tracing::warn!(error = %e, "update password failed");
            reply_error(router, "ErrorMsg", "password update failed").await;
        }
    }
}

async fn handle_create_room(state: &Arc<ServerState>, conn_id: ConnId, router: &Arc<Router>, data: &[u8]) {
    let Some((name, capacity, timeout, settings_raw)) = decode_create_room(data) else {
        return reply_error(router, "ErrorMsg", "malformed CreateRoom").await;
    };
    let mut rooms = state.rooms.lock().await;
    match rooms.create_room(conn_id, name, capacity, timeout, settings_raw) {
        Ok(room_id) => {
            let _ = router.notify("RoomOwner", cbor_array(&[CborField::Int(room_id.0)]));
        }
        Err(e) => {
            tracing::debug!(%conn_id, error = %e, "create room rejected");
            reply_error(router, "ErrorMsg", &e.to_string()).await;
        }
    }
}

async fn handle_enter_room(
    state: &Arc<ServerState>,
    conn_id: ConnId,
    player_id: PlayerId,
    router: &Arc<Router>,
    data: &[u8],
) {
    let Some((room_id, password)) = decode_room_and_password(data) else {
        return reply_error(router, "ErrorMsg", "malformed EnterRoom").await;
    };
    let result = state.rooms.lock().await.enter_room(conn_id, room_id, &password, player_id);
    match result {
        Ok(()) => {
            let _ = router.notify("EnterRoom", cbor_array(&[CborField::Int(room_id.0)]));
        }
        Err(e) => reply_error(router, "ErrorMsg", &e.to_string()).await,
    }
}

async fn handle_observe_room(
    state: &Arc<ServerState>,
    conn_id: ConnId,
    player_id: PlayerId,
    router: &Arc<Router>,
    data: &[u8],
) {
    let Some((room_id, password)) = decode_room_and_password(data) else {
        return reply_error(router, "ErrorMsg", "malformed ObserveRoom").await;
    };
    let result = state.rooms.lock().await.observe_room(conn_id, room_id, &password, player_id);
    match result {
        Ok(()) => {
            let _ = router.notify("ObserveRoom", cbor_array(&[CborField::Int(room_id.0)]));
        }
        Err(e) => reply_error(router, "ErrorMsg", &e.to_string()).await,
    }
}

async fn handle_refresh_room_list(state: &Arc<ServerState>, router: &Arc<Router>) {
    let listings = {
        let rooms = state.rooms.lock().await;
        let users = state.users.lock().await;
        rooms.refresh_room_list(&users).await
    };
    let rows: Vec<ciborium::Value> = listings
        .iter()
        .map(|r| {
            ciborium::Value::Map(vec![
                (ciborium::Value::Text("id".into()), ciborium::Value::Integer(r.id.0.into())),
                (ciborium::Value::Text("name".into()), ciborium::Value::Text(r.name.clone())),
                (ciborium::Value::Text("ownerName".into()), ciborium::Value::Text(r.owner_name.clone())),
                (ciborium::Value::Text("gameMode".into()), ciborium::Value::Text(r.game_mode.clone())),
                (ciborium::Value::Text("playerCount".into()), ciborium::Value::Integer(r.player_count.into())),
                (ciborium::Value::Text("capacity".into()), ciborium::Value::Integer(r.capacity.into())),
                (ciborium::Value::Text("locked".into()), ciborium::Value::Bool(r.locked)),
            ])
        })
        .collect();
    let mut buf = Vec::new();
    if ciborium::into_writer(&ciborium::Value::Array(rows), &mut buf).is_ok() {
        let _ = router.notify("RoomList", buf);
    }
}

async fn handle_chat(state: &Arc<ServerState>, conn_id: ConnId, player_id: PlayerId, router: &Arc<Router>, data: &[u8]) {
    let ban_words = state.config.read().await.ban_words.clone();
    let rooms = state.rooms.lock().await;
    let users = state.users.lock().await;
    if let Err(e) = rooms.chat(player_id, conn_id, data, &ban_words, &state.chat_store, &users).await {
        tracing::debug!(%conn_id, error = %e, "chat rejected");
        drop(users);
        drop(rooms);
        reply_error(router, "ErrorMsg", &e.to_string()).await;
    }
}

async fn handle_quit_room(state: &Arc<ServerState>, conn_id: ConnId) {
    let room_id = state.rooms.lock().await.leave_room(conn_id);
    if let Some(room_id) = room_id {
        finish_abandon_check(state, room_id).await;
    }
}

async fn handle_add_robot(state: &Arc<ServerState>, conn_id: ConnId, router: &Arc<Router>) {
    let room_id = state.rooms.lock().await.location_of(conn_id);
    if room_id.is_lobby() {
        return reply_error(router, "ErrorMsg", "not in a room").await;
    }
    let robot = state.users.lock().await.create_robot(room_id);
    let robot_conn = robot.lock().await.conn_id;
    let result = state.rooms.lock().await.add_robot(room_id, conn_id, robot_conn);
    if let Err(e) = result {
        reply_error(router, "ErrorMsg", &e.to_string()).await;
    }
}

async fn handle_kick_player(state: &Arc<ServerState>, conn_id: ConnId, router: &Arc<Router>, data: &[u8]) {
    let Some(target_id) = decode_single_int(data) else {
        return reply_error(router, "ErrorMsg", "malformed KickPlayer").await;
    };
    let target_account = PlayerId(target_id);
    let room_id = state.rooms.lock().await.location_of(conn_id);
    let target_conn = {
        let users = state.users.lock().await;
        match users.find_player(target_account) {
            Some(player) => player.lock().await.conn_id,
            None => return reply_error(router, "ErrorMsg", "no such player").await,
        }
    };
    let result = state.rooms.lock().await.kick_player(room_id, conn_id, target_conn, target_account);
    if let Err(e) = result {
        reply_error(router, "ErrorMsg", &e.to_string()).await;
    } else {
        state.kick_conn(target_conn).await;
    }
}

async fn handle_ready(state: &Arc<ServerState>, conn_id: ConnId) {
    let room_id = state.rooms.lock().await.location_of(conn_id);
    let _ = state.rooms.lock().await.toggle_ready(room_id, conn_id);
}

async fn handle_start_game(state: &Arc<ServerState>, conn_id: ConnId, router: &Arc<Router>, data: &[u8]) {
    let force = decode_single_bool(data).unwrap_or(false);
    let room_id = state.rooms.lock().await.location_of(conn_id);
    if room_id.is_lobby() {
        return reply_error(router, "ErrorMsg", "not in a room").await;
    }
    let md5 = state.content_md5().await;
    let started = {
        let mut rooms = state.rooms.lock().await;
        rooms.start_game(room_id, conn_id, &md5, force)
    };
    if let Err(e) = started {
        return reply_error(router, "ErrorMsg", &e.to_string()).await;
    }

    let thread = state.threads.get_available_thread(&md5);
    let mut rooms = state.rooms.lock().await;
    if let Some(room) = rooms.room_mut(room_id) {
        room.thread_id = Some(thread.id());
        thread.assign_room(room_id);
        // The real script engine acknowledges `Starting -> Running`
        // asynchronously over its RPC pipe; with none attached here, the
        // transition happens immediately so the rest of the state machine
        // (gameOver, refcount, abandonment) is reachable end to end.
        let _ = room.ack_running();
    }
}

async fn handle_trust(state: &Arc<ServerState>, conn_id: ConnId) {
    let Some(player) = state.users.lock().await.find_by_conn(conn_id) else { return };
    let mut guard = player.lock().await;
    guard.state = match guard.state {
        PlayerState::Trust => PlayerState::Online,
        _ => PlayerState::Trust,
    };
}

async fn handle_change_room(state: &Arc<ServerState>, conn_id: ConnId, router: &Arc<Router>) {
    let result = state.rooms.lock().await.change_room(conn_id);
    if let Err(e) = result {
        reply_error(router, "ErrorMsg", &e.to_string()).await;
    }
}

/// Commands not recognized as a lobby/room command: if the sender is in
/// a `Running` room, they're forwarded to the assigned worker thread's
/// scheduler as a raw request line (§4.7). Outside a running room,
/// they're logged and dropped.
async fn forward_or_ignore(state: &Arc<ServerState>, conn_id: ConnId, player_id: PlayerId, command: &str, data: &[u8]) {
    let room_id = state.rooms.lock().await.location_of(conn_id);
    let is_running = state
        .rooms
        .lock()
        .await
        .room(room_id)
        .map(|r| matches!(r.state, RoomState::Running))
        .unwrap_or(false);
    if !is_running {
        tracing::debug!(%conn_id, %command, "ignoring unrecognized command outside a running room");
        return;
    }
    let payload = String::from_utf8_lossy(data);
    let line = RoomManager::format_worker_request(player_id, conn_id, command, &payload);
    let engine = NullScriptEngine;
    let _ = engine.handle_request(line.into_bytes()).await;
}

async fn finish_abandon_check(state: &Arc<ServerState>, room_id: RoomId) {
    let mut rooms = state.rooms.lock().await;
    let abandoned = match rooms.room_mut(room_id) {
        Some(room) => {
            let any_human_remains = room.players.iter().any(|c| c.0 > 0);
            room.check_abandoned(any_human_remains).await
        }
        None => return,
    };
    if abandoned {
        rooms.destroy_room(room_id);
    }
}

// --- payload decoding helpers ---
//
// Every command payload is a small CBOR array or a single scalar; these
// helpers pull the shapes each handler needs out of a `ciborium::Value`
// without standing up a dedicated serde type for each one, the same way
// `cardforge_room::settings::parse_settings` reads its map directly.

fn decode_value(data: &[u8]) -> Option<ciborium::Value> {
    ciborium::from_reader(data).ok()
}

fn decode_single_text(data: &[u8]) -> Option<String> {
    decode_value(data)?.into_text().ok()
}

fn decode_single_int(data: &[u8]) -> Option<i64> {
    decode_value(data)?.as_integer().and_then(|i| i128::from(i).try_into().ok())
}

fn decode_single_bool(data: &[u8]) -> Option<bool> {
    decode_value(data)?.as_bool()
}

fn decode_two_texts(data: &[u8]) -> Option<(String, String)> {
    let ciborium::Value::Array(elems) = decode_value(data)? else { return None };
    if elems.len() != 2 {
        return None;
    }
    Some((elems[0].as_text()?.to_string(), elems[1].as_text()?.to_string()))
}

fn decode_room_and_password(data: &[u8]) -> Option<(RoomId, String)> {
    let ciborium::Value::Array(elems) = decode_value(data)? else { return None };
    if elems.len() != 2 {
        return None;
    }
    let id: i64 = i128::from(elems[0].as_integer()?).try_into().ok()?;
    let password = elems[1].as_text()?.to_string();
    Some((RoomId(id), password))
}

fn decode_create_room(data: &[u8]) -> Option<(String, i64, u32, Vec<u8>)> {
    let ciborium::Value::Array(elems) = decode_value(data)? else { return None };
    if elems.len() != 4 {
        return None;
    }
    let name = elems[0].as_text()?.to_string();
    let capacity: i64 = i128::from(elems[1].as_integer()?).try_into().ok()?;
    let timeout: i64 = i128::from(elems[2].as_integer()?).try_into().ok()?;
    let settings = elems[3].as_bytes()?.clone();
    Some((name, capacity, timeout.max(0) as u32, settings))
}
