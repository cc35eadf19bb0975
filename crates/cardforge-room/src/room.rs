//! A single room's state machine (§3 `Room`, §4.7).
//!
//! A `Room` owns no sockets and no SQL handle — it is pure state, mutated
//! only from the main reactor (§5). Win-rate persistence goes through the
//! [`StatsStore`] seam so this module stays ignorant of SQL, the same
//! pattern [`cardforge_session::registry::AccountStore`] uses for
//! accounts.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use cardforge_protocol::{ConnId, PlayerId, RoomId};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::base::RoomBase;
use crate::error::RoomError;
use crate::settings::RoomSettings;

/// An opaque handle to the worker thread a room has been assigned to
/// (§4.8). The room layer never looks inside it — only the worker-thread
/// pool and server facade interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub u64);

/// §4.7's state machine. `Idle` covers both "not yet full" and "full but
/// not all ready"; the distinction doesn't need its own state since both
/// reject `StartGame` for the same reason (not ready to start).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Idle,
    Starting,
    Running,
    Ending,
    Abandoned,
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "Idle",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Ending => "Ending",
            Self::Abandoned => "Abandoned",
        };
        f.write_str(s)
    }
}

/// Outcome of a finished game for one player, as reported by the scheduler
/// through `_gameOver`/`_updatePlayerWinRate` (§4.9) and folded into
/// `usergameinfo` win-rate bookkeeping (§4.7 "Win-rate updates").
#[derive(Debug, Clone)]
pub struct PlayerOutcome {
    pub player_id: PlayerId,
    pub conn_id: ConnId,
    pub won: bool,
    /// Disconnected mid-game while still alive (§3 `runned`).
    pub runned: bool,
    pub general: Option<String>,
    pub role: Option<String>,
}

/// The persistence seam for win-rate bookkeeping and the room's global
/// save-state bucket (§4.7, §4.9 `_saveGlobalState`/`_getGlobalSaveState`).
pub trait StatsStore: Send + Sync + 'static {
    async fn record_player_result(&self, player_id: PlayerId, mode: &str, won: bool, runned: bool) -> Result<(), RoomError>;
    async fn record_general_result(&self, general: &str, mode: &str, role: &str, won: bool) -> Result<(), RoomError>;
    async fn save_global_state(&self, key: &str, data: &[u8]) -> Result<(), RoomError>;
    async fn load_global_state(&self, key: &str) -> Result<Vec<u8>, RoomError>;
}

pub struct Room {
    pub base: RoomBase,
    pub name: String,
    pub capacity: u32,
    pub owner: ConnId,
    pub players: Vec<ConnId>,
    pub observers: Vec<ConnId>,
    /// Account ids refused re-entry (e.g. kicked players), §3.
    pub rejected_players: HashSet<PlayerId>,
    pub settings: RoomSettings,
    pub timeout: u32,
    /// Content-pack digest, snapshotted at `StartGame`.
    pub md5: String,
    pub session_id: u64,
    pub session_data: String,
    pub state: RoomState,
    pub thread_id: Option<ThreadId>,
    ready: HashSet<ConnId>,
    ref_count: Arc<Mutex<i64>>,
    request_timer: Option<JoinHandle<()>>,
}

impl Room {
    pub fn new(
        id: RoomId,
        name: String,
        capacity: u32,
        owner: ConnId,
        settings: RoomSettings,
        timeout: u32,
    ) -> Self {
        Room {
            base: RoomBase::new(id),
            name,
            capacity,
            owner,
            players: vec![owner],
            observers: Vec::new(),
            rejected_players: HashSet::new(),
            settings,
            timeout,
            md5: String::new(),
            session_id: 0,
            session_data: "{}".to_string(),
            state: RoomState::Idle,
            thread_id: None,
            ready: HashSet::new(),
            ref_count: Arc::new(Mutex::new(0)),
            request_timer: None,
        }
    }

    pub fn id(&self) -> RoomId {
        self.base.id
    }

    pub fn is_started(&self) -> bool {
        !matches!(self.state, RoomState::Idle)
    }

    pub fn is_locked(&self) -> bool {
        self.settings.is_locked()
    }

    /// §4.7 invariant: `players.size() <= capacity`.
    pub fn join(&mut self, conn_id: ConnId, password_attempt: &str) -> Result<(), RoomError> {
        if self.is_started() {
            return Err(RoomError::AlreadyStarted(self.id()));
        }
        if self.players.contains(&conn_id) {
            return Ok(());
        }
        if self.players.len() as u32 >= self.capacity {
            return Err(RoomError::RoomFull(self.id()));
        }
        if !self.settings.password_matches(password_attempt) {
            return Err(RoomError::PasswordMismatch);
        }
        self.players.push(conn_id);
        Ok(())
    }

    pub fn observe(&mut self, conn_id: ConnId) {
        if !self.observers.contains(&conn_id) {
            self.observers.push(conn_id);
        }
    }

    /// Removes `conn_id` from players/observers/ready. If the owner left
    /// and players remain, the first remaining player becomes owner
    /// (§3 invariant: `owner ∈ players` whenever non-empty).
    pub fn leave(&mut self, conn_id: ConnId) {
        self.players.retain(|c| *c != conn_id);
        self.observers.retain(|c| *c != conn_id);
        self.ready.remove(&conn_id);
        if self.owner == conn_id {
            if let Some(&next) = self.players.first() {
                self.owner = next;
            }
        }
    }

    pub fn kick(&mut self, requester: ConnId, target: ConnId, target_account: PlayerId) -> Result<(), RoomError> {
        self.require_owner(requester)?;
        self.rejected_players.insert(target_account);
        self.leave(target);
        Ok(())
    }

    pub fn toggle_ready(&mut self, conn_id: ConnId) -> bool {
        if self.ready.contains(&conn_id) {
            self.ready.remove(&conn_id);
            false
        } else {
            self.ready.insert(conn_id);
            true
        }
    }

    /// All non-owner players ready, per `StartGame`'s normal-path condition.
    fn all_non_owner_ready(&self) -> bool {
        self.players.iter().all(|c| *c == self.owner || self.ready.contains(c))
    }

    pub fn require_owner(&self, conn_id: ConnId) -> Result<(), RoomError> {
        if conn_id == self.owner {
            Ok(())
        } else {
            Err(RoomError::NotOwner(PlayerId(conn_id.0), self.id()))
        }
    }

    /// Idle → Starting (§4.7). `force` lets the owner start without every
    /// seat ready/filled, matching `manuallyStart()`'s owner-forced path.
    pub fn start(&mut self, requester: ConnId, content_md5: &str, force: bool) -> Result<(), RoomError> {
        self.require_owner(requester)?;
        if !matches!(self.state, RoomState::Idle) {
            return Err(RoomError::InvalidState(format!("cannot start room in state {}", self.state)));
        }
        let ready_to_start = force || (self.players.len() as u32 == self.capacity && self.all_non_owner_ready());
        if !ready_to_start {
            return Err(RoomError::InvalidState("not all players are ready".into()));
        }
        self.md5 = content_md5.to_string();
        self.session_id += 1;
        self.state = RoomState::Starting;
        Ok(())
    }

    /// Starting → Running, once the scheduler acknowledges (§4.7).
    pub fn ack_running(&mut self) -> Result<(), RoomError> {
        if !matches!(self.state, RoomState::Starting) {
            return Err(RoomError::InvalidState(format!("cannot run room in state {}", self.state)));
        }
        self.state = RoomState::Running;
        Ok(())
    }

    /// Running → Ending, called by the scheduler via `_gameOver`. Folds
    /// each player's outcome into persistent win-rate stats.
    pub async fn game_over(&mut self, outcomes: &[PlayerOutcome], stats: &impl StatsStore) -> Result<(), RoomError> {
        if !matches!(self.state, RoomState::Running) {
            return Err(RoomError::InvalidState(format!("cannot end room in state {}", self.state)));
        }
        for outcome in outcomes {
            stats.record_player_result(outcome.player_id, &self.settings.game_mode, outcome.won, outcome.runned).await?;
            if let (Some(general), Some(role)) = (&outcome.general, &outcome.role) {
                stats.record_general_result(general, &self.settings.game_mode, role, outcome.won).await?;
            }
        }
        self.state = RoomState::Ending;
        Ok(())
    }

    /// Ending → Idle, on a fresh `StartGame` for the next session.
    pub fn restart_to_idle(&mut self) -> Result<(), RoomError> {
        if !matches!(self.state, RoomState::Ending) {
            return Err(RoomError::InvalidState(format!("cannot restart room in state {}", self.state)));
        }
        self.state = RoomState::Idle;
        Ok(())
    }

    /// Ending → Abandoned, once the last human has left and no scheduler
    /// coroutine still references the room (§4.7 "Reference count").
    pub async fn check_abandoned(&mut self, any_human_remains: bool) -> bool {
        if any_human_remains {
            return false;
        }
        if *self.ref_count.lock().await != 0 {
            return false;
        }
        self.state = RoomState::Abandoned;
        true
    }

    pub fn ref_count_handle(&self) -> Arc<Mutex<i64>> {
        self.ref_count.clone()
    }

    pub async fn increase_ref_count(&self) {
        *self.ref_count.lock().await += 1;
    }

    pub async fn decrease_ref_count(&self) {
        let mut count = self.ref_count.lock().await;
        *count = (*count - 1).max(0);
    }

    /// Arms a single-shot, cancelable request timer (§4.7 "Request timer").
    /// Arming replaces any previous timer.
    pub fn arm_request_timer(&mut self, timeout: Duration, on_expire: oneshot::Sender<()>) {
        self.cancel_request_timer();
        self.request_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = on_expire.send(());
        }));
    }

    pub fn cancel_request_timer(&mut self) {
        if let Some(handle) = self.request_timer.take() {
            handle.abort();
        }
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        self.cancel_request_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(capacity: u32) -> Room {
        Room::new(RoomId(1), "room".into(), capacity, ConnId(1000), RoomSettings { game_mode: "m1".into(), password: String::new(), raw: Vec::new() }, 30)
    }

    #[test]
    fn join_enforces_capacity() {
        let mut r = room(2);
        r.join(ConnId(1001), "").unwrap();
        assert!(r.join(ConnId(1002), "").is_err());
    }

    #[test]
    fn join_rejects_wrong_password() {
        let mut r = Room::new(RoomId(1), "room".into(), 2, ConnId(1000), RoomSettings { game_mode: "m1".into(), password: "secret".into(), raw: Vec::new() }, 30);
        assert!(matches!(r.join(ConnId(1001), "wrong"), Err(RoomError::PasswordMismatch)));
        r.join(ConnId(1001), "secret").unwrap();
        assert_eq!(r.players.len(), 2);
    }

    #[test]
    fn owner_reassigned_when_original_owner_leaves() {
        let mut r = room(3);
        r.join(ConnId(1001), "").unwrap();
        r.leave(ConnId(1000));
        assert_eq!(r.owner, ConnId(1001));
        assert!(r.players.contains(&r.owner));
    }

    #[test]
    fn start_requires_owner_and_all_ready() {
        let mut r = room(2);
        r.join(ConnId(1001), "").unwrap();
        assert!(r.start(ConnId(1000), "md5", false).is_err(), "not ready yet");
        r.toggle_ready(ConnId(1001));
        r.start(ConnId(1000), "md5", false).unwrap();
        assert_eq!(r.state, RoomState::Starting);
        assert_eq!(r.session_id, 1);
    }

    #[test]
    fn only_owner_can_start() {
        let mut r = room(2);
        r.join(ConnId(1001), "").unwrap();
        r.toggle_ready(ConnId(1001));
        assert!(matches!(r.start(ConnId(1001), "md5", false), Err(RoomError::NotOwner(_, _))));
    }

    #[test]
    fn forced_start_skips_ready_check() {
        let mut r = room(4);
        r.start(ConnId(1000), "md5", true).unwrap();
        assert_eq!(r.state, RoomState::Starting);
    }

    #[tokio::test]
    async fn ref_count_gates_abandonment() {
        let mut r = room(1);
        r.increase_ref_count().await;
        assert!(!r.check_abandoned(false).await);
        r.decrease_ref_count().await;
        assert!(r.check_abandoned(false).await);
        assert_eq!(r.state, RoomState::Abandoned);
    }

    #[tokio::test]
    async fn game_over_records_outcomes_through_stats_seam() {
        struct FakeStats {
            calls: std::sync::Mutex<Vec<(PlayerId, bool)>>,
        }
        impl StatsStore for FakeStats {
            async fn record_player_result(&self, player_id: PlayerId, _mode: &str, won: bool, _runned: bool) -> Result<(), RoomError> {
                self.calls.lock().unwrap().push((player_id, won));
                Ok(())
            }
            async fn record_general_result(&self, _general: &str, _mode: &str, _role: &str, _won: bool) -> Result<(), RoomError> {
                Ok(())
            }
            async fn save_global_state(&self, _key: &str, _data: &[u8]) -> Result<(), RoomError> {
                Ok(())
            }
            async fn load_global_state(&self, _key: &str) -> Result<Vec<u8>, RoomError> {
                Ok(b"{}".to_vec())
            }
        }

        let mut r = room(2);
        r.join(ConnId(1001), "").unwrap();
        r.toggle_ready(ConnId(1001));
        r.start(ConnId(1000), "md5", false).unwrap();
        r.ack_running().unwrap();

        let stats = FakeStats { calls: std::sync::Mutex::new(Vec::new()) };
        let outcomes = vec![
            PlayerOutcome { player_id: PlayerId(1), conn_id: ConnId(1000), won: true, runned: false, general: None, role: None },
            PlayerOutcome { player_id: PlayerId(2), conn_id: ConnId(1001), won: false, runned: false, general: None, role: None },
        ];
        r.game_over(&outcomes, &stats).await.unwrap();
        assert_eq!(r.state, RoomState::Ending);
        assert_eq!(stats.calls.lock().unwrap().len(), 2);
    }
}
