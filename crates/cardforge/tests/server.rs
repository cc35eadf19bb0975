//! End-to-end tests: a real [`cardforge::state::ServerState`] behind a real
//! [`TcpTransport`], exercised with the raw length-prefixed CBOR wire the
//! client actually speaks (§4.4 Setup handshake, §4.6 lobby, §4.7 room).
//!
//! The server under test is started once, on its own OS thread with its
//! own runtime, and shared by every test in this file — the same shape
//! `cardforge-persist::DbWorker` and `cardforge-worker::ThreadPool` use for
//! a resource that has to outlive any single task. Each test picks a
//! fresh screen name/uuid so they don't collide in the shared account
//! store.

use std::sync::{Arc, OnceLock};

use ciborium::Value;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use cardforge::config::ServerConfig;
use cardforge::state::{self, ServerState};
use cardforge::handler;
use cardforge_persist::{AuthDb, DbWorker};
use cardforge_protocol::{decode_packet, encode_packet, Packet, PacketType, REQUEST_ID_NOTIFICATION};
use cardforge_session::AuthManager;
use cardforge_transport::{TcpTransport, Transport};

/// Same schema `cardforge::stores`'s own unit tests open `AuthDb` against.
const AUTH_INIT: &str = "
    CREATE TABLE userinfo (id INTEGER PRIMARY KEY, name TEXT, password TEXT, salt TEXT, avatar TEXT, lastLoginIp TEXT, banned INTEGER);
    CREATE TABLE usergameinfo (id INTEGER PRIMARY KEY, registerTime INTEGER, lastLoginTime INTEGER, totalGameTime INTEGER, totalGames INTEGER, winCount INTEGER, runCount INTEGER);
    CREATE TABLE uuidinfo (id INTEGER, uuid TEXT);
    CREATE TABLE banuuid (uuid TEXT);
    CREATE TABLE whitelist (name TEXT);
    CREATE TABLE tempmute (uid INTEGER, expireAt INTEGER, type INTEGER);
    CREATE TABLE generalWinRate (general TEXT, mode TEXT, role TEXT, totalGames INTEGER, winCount INTEGER);
";

const TEST_MD5: &str = "test-content-digest";
const TEST_VERSION: &str = "0.5.14";

/// Boots the shared server on a dedicated thread the first time any test
/// calls this, and returns its listen address. Subsequent calls are free.
fn test_server_addr() -> String {
    static ADDR: OnceLock<String> = OnceLock::new();
    ADDR.get_or_init(|| {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .expect("build test server runtime");
            rt.block_on(async move {
                let tmp = tempfile::tempdir().expect("tempdir for rsa key");
                let auth = AuthManager::load_or_generate(tmp.path().join("rsa")).expect("generate rsa key");
                let auth_db = Arc::new(AuthDb::open(":memory:", Some(AUTH_INIT)).expect("open auth db"));
                let game_db = DbWorker::spawn(":memory:", None, "cardforge-test-game-db");
                let config = ServerConfig::parse("{}");
                let state = Arc::new(ServerState::new(auth, auth_db, game_db, config, TEST_MD5.to_string()));
                state::install(state.clone());

                let mut tcp = TcpTransport::bind("127.0.0.1:0").await.expect("bind tcp");
                let addr = tcp.local_addr().expect("local addr").to_string();
                tx.send(addr).expect("send addr back to test thread");

                loop {
                    let conn = tcp.accept().await.expect("accept");
                    let peer_ip = conn.peer_addr().ip().to_string();
                    let conn = Arc::new(conn);
                    tokio::spawn(handler::handle_connection(conn, peer_ip));
                }
            });
        });
        rx.recv().expect("receive test server address")
    })
    .clone()
}

async fn read_frame(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    if stream.read_exact(&mut len_buf).await.is_err() {
        return None;
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.ok()?;
    Some(buf)
}

async fn write_frame(stream: &mut TcpStream, data: &[u8]) {
    stream.write_all(&(data.len() as u32).to_be_bytes()).await.expect("write frame length");
    stream.write_all(data).await.expect("write frame body");
}

async fn recv_packet(stream: &mut TcpStream) -> Option<Packet> {
    let bytes = read_frame(stream).await?;
    decode_packet(&bytes).ok()
}

async fn recv_packet_timeout(stream: &mut TcpStream) -> Option<Packet> {
    tokio::time::timeout(std::time::Duration::from_secs(2), recv_packet(stream))
        .await
        .unwrap_or(None)
}

fn client_command(command: &str, data: Vec<u8>) -> Packet {
    Packet {
        request_id: REQUEST_ID_NOTIFICATION,
        packet_type: PacketType::NOTIFICATION | PacketType::SRC_CLIENT | PacketType::DEST_SERVER,
        command: command.to_string(),
        data,
        timeout: None,
        timestamp: None,
    }
}

async fn send_command(stream: &mut TcpStream, command: &str, data: Vec<u8>) {
    let bytes = encode_packet(&client_command(command, data)).expect("encode command");
    write_frame(stream, &bytes).await;
}

/// Connects and reads the `InstallKey` early packet every connection gets
/// before Setup (§4.4 step 1).
async fn connect_and_read_key(addr: &str) -> (TcpStream, RsaPublicKey) {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let packet = recv_packet(&mut stream).await.expect("install key packet");
    assert_eq!(packet.command, "InstallKey");
    let pub_key = RsaPublicKey::from_pkcs1_der(&packet.data).expect("parse der public key");
    (stream, pub_key)
}

fn encrypt_credential(pub_key: &RsaPublicKey, password: &str) -> Vec<u8> {
    let mut cleartext = vec![0u8; 32];
    cleartext.extend_from_slice(password.as_bytes());
    let mut rng = rand::rngs::OsRng;
    pub_key.encrypt(&mut rng, Pkcs1v15Encrypt, &cleartext).expect("rsa encrypt credential")
}

fn setup_payload(screen_name: &str, password_cipher: Vec<u8>, md5: &str, uuid: &str) -> Vec<u8> {
    let elems = vec![
        Value::Text(screen_name.to_string()),
        Value::Bytes(password_cipher),
        Value::Text(md5.to_string()),
        Value::Text(TEST_VERSION.to_string()),
        Value::Text(uuid.to_string()),
    ];
    let mut buf = Vec::new();
    ciborium::into_writer(&Value::Array(elems), &mut buf).expect("encode setup payload");
    buf
}

async fn send_setup(
    stream: &mut TcpStream,
    pub_key: &RsaPublicKey,
    screen_name: &str,
    password: &str,
    md5: &str,
    uuid: &str,
) {
    let cipher = encrypt_credential(pub_key, password);
    let payload = setup_payload(screen_name, cipher, md5, uuid);
    send_command(stream, "Setup", payload).await;
}

fn decode_value(data: &[u8]) -> Value {
    ciborium::from_reader(data).expect("decode cbor value")
}

/// Connects, completes a successful Setup, and returns the stream plus the
/// decoded `(id, avatar)` from the reply.
async fn login(addr: &str, screen_name: &str, password: &str, uuid: &str) -> (TcpStream, i64, String) {
    let (mut stream, pub_key) = connect_and_read_key(addr).await;
    send_setup(&mut stream, &pub_key, screen_name, password, TEST_MD5, uuid).await;
    let reply = recv_packet(&mut stream).await.expect("setup reply");
    assert_eq!(reply.command, "Setup");
    let Value::Array(fields) = decode_value(&reply.data) else { panic!("setup reply is not an array") };
    let id: i64 = i128::from(fields[0].as_integer().unwrap()).try_into().unwrap();
    let avatar = fields[2].as_text().unwrap().to_string();
    (stream, id, avatar)
}

fn room_settings(game_mode: &str, password: &str) -> Vec<u8> {
    let map = Value::Map(vec![
        (Value::Text("gameMode".into()), Value::Text(game_mode.into())),
        (Value::Text("password".into()), Value::Text(password.into())),
    ]);
    let mut buf = Vec::new();
    ciborium::into_writer(&map, &mut buf).expect("encode room settings");
    buf
}

fn create_room_payload(name: &str, capacity: i64, timeout: u32, settings: Vec<u8>) -> Vec<u8> {
    let array = Value::Array(vec![
        Value::Text(name.to_string()),
        Value::Integer(capacity.into()),
        Value::Integer((timeout as i64).into()),
        Value::Bytes(settings),
    ]);
    let mut buf = Vec::new();
    ciborium::into_writer(&array, &mut buf).expect("encode create room payload");
    buf
}

fn room_and_password_payload(room_id: i64, password: &str) -> Vec<u8> {
    let array = Value::Array(vec![Value::Integer(room_id.into()), Value::Text(password.to_string())]);
    let mut buf = Vec::new();
    ciborium::into_writer(&array, &mut buf).expect("encode room+password payload");
    buf
}

fn chat_payload(scope: i64, msg: &str) -> Vec<u8> {
    let map = Value::Map(vec![
        (Value::Text("type".into()), Value::Integer(scope.into())),
        (Value::Text("msg".into()), Value::Text(msg.to_string())),
    ]);
    let mut buf = Vec::new();
    ciborium::into_writer(&map, &mut buf).expect("encode chat payload");
    buf
}

#[tokio::test]
async fn setup_new_account_receives_profile() {
    let addr = test_server_addr();
    let (_stream, id, avatar) = login(&addr, "alice_new", "hunter2", "uuid-alice-new").await;
    assert!(id > 0);
    assert_eq!(avatar, "liubei");
}

#[tokio::test]
async fn setup_wrong_password_is_rejected() {
    let addr = test_server_addr();
    let (_first, _id, _avatar) = login(&addr, "bob_wrongpw", "correct-horse", "uuid-bob-wrongpw").await;

    let (mut stream, pub_key) = connect_and_read_key(&addr).await;
    send_setup(&mut stream, &pub_key, "bob_wrongpw", "not-the-password", TEST_MD5, "uuid-bob-wrongpw-2").await;
    let reply = recv_packet(&mut stream).await.expect("error reply");
    assert_eq!(reply.command, "ErrorDlg");

    // The handler closes the socket after a rejected Setup.
    assert!(recv_packet_timeout(&mut stream).await.is_none());
}

#[tokio::test]
async fn setup_outdated_md5_sends_update_package() {
    let addr = test_server_addr();
    let (mut stream, pub_key) = connect_and_read_key(&addr).await;
    send_setup(&mut stream, &pub_key, "carol_outdated", "hunter2", "stale-md5", "uuid-carol-outdated").await;
    let reply = recv_packet(&mut stream).await.expect("update package reply");
    assert_eq!(reply.command, "UpdatePackage");
    assert_eq!(reply.data, TEST_MD5.as_bytes());
    assert!(recv_packet_timeout(&mut stream).await.is_none());
}

#[tokio::test]
async fn duplicate_login_kicks_previous_connection() {
    let addr = test_server_addr();
    let (mut first, _id, _avatar) = login(&addr, "dave_dup", "hunter2", "uuid-dave-dup").await;
    let (_second, _id2, _avatar2) = login(&addr, "dave_dup", "hunter2", "uuid-dave-dup-device-2").await;

    // The first connection's handler observes its kick signal and closes.
    assert!(recv_packet_timeout(&mut first).await.is_none());
}

#[tokio::test]
async fn create_room_then_refresh_room_list_shows_it() {
    let addr = test_server_addr();
    let (mut owner, _id, _avatar) = login(&addr, "erin_owner", "hunter2", "uuid-erin-owner").await;

    send_command(
        &mut owner,
        "CreateRoom",
        create_room_payload("erin's room", 2, 30, room_settings("mode1", "")),
    )
    .await;
    let reply = recv_packet(&mut owner).await.expect("room owner reply");
    assert_eq!(reply.command, "RoomOwner");
    let Value::Array(fields) = decode_value(&reply.data) else { panic!("RoomOwner payload is not an array") };
    let room_id: i64 = i128::from(fields[0].as_integer().unwrap()).try_into().unwrap();
    assert!(room_id > 0);

    send_command(&mut owner, "RefreshRoomList", Vec::new()).await;
    let listing = recv_packet(&mut owner).await.expect("room list reply");
    assert_eq!(listing.command, "RoomList");
    let Value::Array(rows) = decode_value(&listing.data) else { panic!("RoomList payload is not an array") };
    assert_eq!(rows.len(), 1);
    let Value::Map(entry) = &rows[0] else { panic!("room list entry is not a map") };
    let find = |key: &str| entry.iter().find(|(k, _)| k.as_text() == Some(key)).map(|(_, v)| v.clone());
    assert_eq!(i128::from(find("id").unwrap().as_integer().unwrap()), room_id as i128);
    assert_eq!(find("ownerName").unwrap().as_text().unwrap(), "erin_owner");
    assert_eq!(i128::from(find("playerCount").unwrap().as_integer().unwrap()), 1i128);
    assert_eq!(i128::from(find("capacity").unwrap().as_integer().unwrap()), 2i128);
    assert_eq!(find("locked").unwrap().as_bool().unwrap(), false);
}

#[tokio::test]
async fn enter_room_ready_and_start_game_reaches_running() {
    let addr = test_server_addr();
    let (mut owner, _owner_id, _) = login(&addr, "frank_owner", "hunter2", "uuid-frank-owner").await;
    let (mut joiner, _joiner_id, _) = login(&addr, "gina_joiner", "hunter2", "uuid-gina-joiner").await;

    send_command(
        &mut owner,
        "CreateRoom",
        create_room_payload("frank's room", 2, 30, room_settings("mode1", "")),
    )
    .await;
    let owner_reply = recv_packet(&mut owner).await.expect("room owner reply");
    let Value::Array(fields) = decode_value(&owner_reply.data) else { panic!("RoomOwner payload is not an array") };
    let room_id: i64 = i128::from(fields[0].as_integer().unwrap()).try_into().unwrap();

    send_command(&mut joiner, "EnterRoom", room_and_password_payload(room_id, "")).await;
    let enter_reply = recv_packet(&mut joiner).await.expect("enter room reply");
    assert_eq!(enter_reply.command, "EnterRoom");

    // Owner seats don't need to ready up; only the non-owner does (§4.7).
    send_command(&mut joiner, "Ready", Vec::new()).await;
    // `Ready` has no direct reply; give the dispatch loop a beat to land it.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut force_false = Vec::new();
    ciborium::into_writer(&Value::Bool(false), &mut force_false).unwrap();
    send_command(&mut owner, "StartGame", force_false).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let state = state::get();
    let rooms = state.rooms.lock().await;
    let room = rooms.room(cardforge_protocol::RoomId(room_id)).expect("room still exists");
    assert!(matches!(room.state, cardforge_room::RoomState::Running));
}

#[tokio::test]
async fn lobby_chat_is_broadcast_to_every_lobby_connection() {
    let addr = test_server_addr();
    let (mut sender, sender_id, _) = login(&addr, "henry_chat", "hunter2", "uuid-henry-chat").await;
    let (mut other, _, _) = login(&addr, "irene_chat", "hunter2", "uuid-irene-chat").await;

    send_command(&mut sender, "Chat", chat_payload(1, "hello lobby")).await;

    for stream in [&mut sender, &mut other] {
        let packet = recv_packet(stream).await.expect("chat broadcast");
        assert_eq!(packet.command, "Chat");
        let Value::Map(entry) = decode_value(&packet.data) else { panic!("chat payload is not a map") };
        let find = |key: &str| entry.iter().find(|(k, _)| k.as_text() == Some(key)).map(|(_, v)| v.clone());
        assert_eq!(i128::from(find("sender").unwrap().as_integer().unwrap()), sender_id as i128);
        assert_eq!(find("msg").unwrap().as_text().unwrap(), "hello lobby");
    }
}
