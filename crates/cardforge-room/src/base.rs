//! `RoomBase`: the behavior shared by the [`crate::Lobby`] and every
//! [`crate::Room`] — an id plus a broadcast helper.
//!
//! The source models `RoomBase` as an abstract C++ parent class; Rust has
//! no use for that shape here, so `Lobby` and `Room` each hold a
//! `RoomBase` field and delegate to it instead of inheriting from it.

use cardforge_protocol::{ConnId, RoomId};
use cardforge_session::UserManager;

pub struct RoomBase {
    pub id: RoomId,
}

impl RoomBase {
    pub fn new(id: RoomId) -> Self {
        RoomBase { id }
    }

    /// Sends a notification to every connection in `conns`, skipping any
    /// that have no player record or no live socket (e.g. a robot, or a
    /// player who just went `Offline`).
    pub async fn broadcast_notify(
        &self,
        users: &UserManager,
        conns: &[ConnId],
        command: &str,
        data: Vec<u8>,
    ) {
        for &conn_id in conns {
            let Some(player) = users.find_by_conn(conn_id) else { continue };
            let router = player.lock().await.router.clone();
            if let Some(router) = router {
                let _ = router.notify(command.to_string(), data.clone());
            }
        }
    }
}
