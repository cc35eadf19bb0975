//! End-to-end room lifecycle, mirroring the literal create/join/ready/
//! start scenario: alice creates a 2-capacity room, bob enters, both
//! ready up, alice starts it.

use std::collections::HashSet;

use cardforge_protocol::{ConnId, PlayerId};
use cardforge_room::{RoomManager, RoomState};

fn encode_settings(mode: &str, password: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    let map = ciborium::Value::Map(vec![
        (ciborium::Value::Text("gameMode".into()), ciborium::Value::Text(mode.into())),
        (ciborium::Value::Text("password".into()), ciborium::Value::Text(password.into())),
    ]);
    ciborium::into_writer(&map, &mut buf).unwrap();
    buf
}

const ALICE: ConnId = ConnId(1000);
const BOB: ConnId = ConnId(1001);

#[test]
fn create_join_ready_start() {
    let mut mgr = RoomManager::new(HashSet::new());
    mgr.place_in_lobby(ALICE);
    mgr.place_in_lobby(BOB);

    let room_id = mgr
        .create_room(ALICE, "room".into(), 2, 30, encode_settings("m1", ""))
        .expect("room creation");
    assert_eq!(room_id.0, 1);
    assert!(!mgr.lobby().contains(ALICE));

    mgr.enter_room(BOB, room_id, "", PlayerId(2)).expect("bob enters");
    assert!(!mgr.lobby().contains(BOB));

    {
        let room = mgr.room(room_id).unwrap();
        assert_eq!(room.players, vec![ALICE, BOB]);
        assert_eq!(room.state, RoomState::Idle);
    }

    mgr.toggle_ready(room_id, BOB).unwrap();
    mgr.toggle_ready(room_id, ALICE).unwrap();
    mgr.start_game(room_id, ALICE, "content-md5", false).expect("owner starts");

    let room = mgr.room(room_id).unwrap();
    assert_eq!(room.state, RoomState::Starting);
    assert_eq!(room.session_id, 1);
    assert_eq!(room.md5, "content-md5");
}

#[test]
fn forced_start_bypasses_capacity_and_ready_checks() {
    let mut mgr = RoomManager::new(HashSet::new());
    mgr.place_in_lobby(ALICE);
    let room_id = mgr
        .create_room(ALICE, "room".into(), 2, 30, encode_settings("m1", ""))
        .unwrap();

    assert!(mgr.start_game(room_id, ALICE, "md5", false).is_err());
    mgr.start_game(room_id, ALICE, "md5", true).expect("forced start bypasses capacity");
    assert_eq!(mgr.room(room_id).unwrap().state, RoomState::Starting);
}

#[test]
fn leaving_a_room_returns_to_lobby_and_reassigns_owner() {
    let mut mgr = RoomManager::new(HashSet::new());
    mgr.place_in_lobby(ALICE);
    mgr.place_in_lobby(BOB);
    let room_id = mgr
        .create_room(ALICE, "room".into(), 2, 30, encode_settings("m1", ""))
        .unwrap();
    mgr.enter_room(BOB, room_id, "", PlayerId(2)).unwrap();

    mgr.leave_room(ALICE);
    assert!(mgr.lobby().contains(ALICE));
    assert_eq!(mgr.room(room_id).unwrap().owner, BOB);
}
