//! The player registry (`UserManager`): who's connected, who's a robot,
//! and the Setup-packet orchestration that turns a raw connection into an
//! admitted [`Player`].

use std::collections::HashMap;
use std::sync::Arc;

use cardforge_protocol::{ConnId, PlayerId, Router};
use tokio::sync::Mutex;
use tracing::info;

use crate::auth::{self, AuthManager, SetupFields};
use crate::error::{AuthError, SessionError};
use crate::player::{Player, PlayerState};

/// A stored account row, as read or created by persistence.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: PlayerId,
    pub password_hash: String,
    pub salt: String,
    pub banned: bool,
    pub avatar: String,
    pub total_game_time: u64,
}

/// The persistence seam for account data (§4.4). A concrete implementation
/// backed by `cardforge-persist::AuthDb` is wired up by the top-level
/// server; this trait keeps the registry ignorant of SQL.
pub trait AccountStore: Send + Sync + 'static {
    async fn find_by_name(&self, screen_name: &str) -> Result<Option<Account>, SessionError>;
    async fn create(&self, screen_name: &str, password_hash: &str, salt: &str) -> Result<Account, SessionError>;
    async fn count_for_uuid(&self, uuid: &str) -> Result<u32, SessionError>;
    async fn is_uuid_banned(&self, uuid: &str) -> Result<bool, SessionError>;
    async fn is_name_whitelisted(&self, screen_name: &str) -> Result<bool, SessionError>;
    async fn upsert_uuid(&self, id: PlayerId, uuid: &str) -> Result<(), SessionError>;
    async fn record_login(&self, id: PlayerId, ip: &str) -> Result<(), SessionError>;
}

/// Server-wide policy knobs the Setup flow needs but doesn't own.
#[derive(Debug, Clone)]
pub struct SetupPolicy {
    pub ban_words: Vec<String>,
    pub whitelist_enabled: bool,
    pub max_players_per_device: u32,
    pub current_md5: String,
}

/// Runs §4.4 steps 1–9: parse, validate, and resolve to an [`Account`].
/// Duplicate-login handling (step 10) happens in [`UserManager::admit`]
/// once the caller has a socket-backed [`Router`] to attach.
pub async fn validate_setup(
    auth: &AuthManager,
    store: &impl AccountStore,
    policy: &SetupPolicy,
    raw_setup: &[u8],
) -> Result<(Account, SetupFields), AuthError> {
    let fields = auth::parse_setup(raw_setup)?;

    if fields.md5 != policy.current_md5 {
        return Err(AuthError::PackageOutdated);
    }
    if fields.screen_name.is_empty() || auth::contains_ban_word(&fields.screen_name, &policy.ban_words) {
        return Err(AuthError::NameRejected(fields.screen_name.clone()));
    }
    if store
        .is_uuid_banned(&fields.uuid)
        .await
        .map_err(|_| AuthError::BadCredential)?
    {
        return Err(AuthError::UuidBanned);
    }

    let cleartext = auth.decrypt(&fields.password_cipher)?;
    let credential = auth::split_credential(cleartext)?;

    let account = match store
        .find_by_name(&fields.screen_name)
        .await
        .map_err(|_| AuthError::BadCredential)?
    {
        Some(account) => {
            let expected = auth::hash_password(&credential.password, &account.salt);
            if expected != account.password_hash {
                return Err(AuthError::WrongPassword);
            }
            if account.banned {
                return Err(AuthError::AccountBanned);
            }
            account
        }
        None => {
            if policy.whitelist_enabled
                && !store
                    .is_name_whitelisted(&fields.screen_name)
                    .await
                    .map_err(|_| AuthError::BadCredential)?
            {
                return Err(AuthError::NameRejected(fields.screen_name.clone()));
            }
            let device_count = store
                .count_for_uuid(&fields.uuid)
                .await
                .map_err(|_| AuthError::BadCredential)?;
            if device_count >= policy.max_players_per_device {
                return Err(AuthError::DeviceAccountLimitReached);
            }
            let salt = auth::generate_salt();
            let hash = auth::hash_password(&credential.password, &salt);
            store
                .create(&fields.screen_name, &hash, &salt)
                .await
                .map_err(|_| AuthError::BadCredential)?
        }
    };

    store
        .upsert_uuid(account.id, &fields.uuid)
        .await
        .map_err(|_| AuthError::BadCredential)?;

    Ok((account, fields))
}

/// Outcome of admitting a validated account onto a fresh connection.
pub enum AdmitOutcome {
    /// A brand new player record: no prior session for this account.
    Fresh(Arc<Mutex<Player>>),
    /// The account was already online; that session was kicked and this
    /// connection takes over as a fresh one.
    KickedPrevious(Arc<Mutex<Player>>),
    /// The account was Offline and mid-game; the existing record is
    /// reattached to the new socket rather than replaced.
    Reconnected(Arc<Mutex<Player>>),
}

/// Tracks every connected or recently-disconnected player, plus robots.
#[derive(Default)]
pub struct UserManager {
    by_conn: HashMap<ConnId, Arc<Mutex<Player>>>,
    online_by_id: HashMap<PlayerId, ConnId>,
    robots: HashMap<PlayerId, Arc<Mutex<Player>>>,
    next_robot_id: i64,
}

impl UserManager {
    pub fn new() -> Self {
        UserManager { next_robot_id: -1, ..Default::default() }
    }

    pub fn find_by_conn(&self, conn_id: ConnId) -> Option<Arc<Mutex<Player>>> {
        self.by_conn.get(&conn_id).cloned()
    }

    /// Online first, then robots — matches the source's lookup order.
    pub fn find_player(&self, id: PlayerId) -> Option<Arc<Mutex<Player>>> {
        if let Some(conn_id) = self.online_by_id.get(&id) {
            return self.by_conn.get(conn_id).cloned();
        }
        self.robots.get(&id).cloned()
    }

    pub fn online_count(&self) -> usize {
        self.online_by_id.len()
    }

    /// Admits a validated account onto `conn_id`/`router`, handling
    /// duplicate-login (§4.4 step 10, P8).
    pub async fn admit(
        &mut self,
        account: &Account,
        conn_id: ConnId,
        screen_name: String,
        uuid: String,
        router: Arc<Router>,
    ) -> AdmitOutcome {
        if let Some(&existing_conn) = self.online_by_id.get(&account.id) {
            let existing = self.by_conn.get(&existing_conn).cloned();
            let was_offline = match existing.as_ref() {
                Some(p) => matches!(p.lock().await.state, PlayerState::Offline),
                None => false,
            };

            if was_offline {
                if let Some(existing) = existing {
                    {
                        let mut guard = existing.lock().await;
                        guard.conn_id = conn_id;
                        guard.router = Some(router);
                        guard.state = PlayerState::Online;
                        guard.reset_ttl();
                    }
                    self.by_conn.remove(&existing_conn);
                    self.by_conn.insert(conn_id, existing.clone());
                    self.online_by_id.insert(account.id, conn_id);
                    info!(player = %account.id, "reconnected");
                    return AdmitOutcome::Reconnected(existing);
                }
            }

            // Still Online/Robot: the old session is kicked by the caller
            // (it owns that connection's socket); we just drop our
            // bookkeeping for it here.
            self.by_conn.remove(&existing_conn);
            self.online_by_id.remove(&account.id);
            let player = Arc::new(Mutex::new(Player::new_human(
                account.id,
                conn_id,
                screen_name,
                uuid,
                router,
            )));
            self.by_conn.insert(conn_id, player.clone());
            self.online_by_id.insert(account.id, conn_id);
            info!(player = %account.id, "kicked previous session and logged in again");
            return AdmitOutcome::KickedPrevious(player);
        }

        let player = Arc::new(Mutex::new(Player::new_human(account.id, conn_id, screen_name, uuid, router)));
        self.by_conn.insert(conn_id, player.clone());
        self.online_by_id.insert(account.id, conn_id);
        info!(player = %account.id, "logged in");
        AdmitOutcome::Fresh(player)
    }

    /// Removes bookkeeping for a disconnected connection. If the player
    /// is mid-game (`inside_game()`), the record is kept as `Offline`
    /// rather than removed, so it can be reattached on reconnect.
    pub async fn remove_conn(&mut self, conn_id: ConnId) {
        let Some(player) = self.by_conn.get(&conn_id).cloned() else { return };
        let (id, keep) = {
            let mut guard = player.lock().await;
            guard.router = None;
            let keep = guard.inside_game();
            if keep {
                guard.state = PlayerState::Offline;
            }
            (guard.id, keep)
        };
        if !keep {
            self.online_by_id.remove(&id);
            self.by_conn.remove(&conn_id);
        }
    }

    pub fn create_robot(&mut self, room_id: cardforge_protocol::RoomId) -> Arc<Mutex<Player>> {
        let id = PlayerId(self.next_robot_id);
        self.next_robot_id -= 1;
        let conn_id = ConnId(id.0);
        let robot = Arc::new(Mutex::new(Player::new_robot(id, room_id, conn_id)));
        self.robots.insert(id, robot.clone());
        robot
    }

    /// Runs one heartbeat tick (§4.11): decrements every online player's
    /// `ttl`, returning those who should be kicked.
    pub async fn heartbeat_tick(&self) -> Vec<ConnId> {
        let mut to_kick = Vec::new();
        for (&conn_id, player) in &self.by_conn {
            let mut guard = player.lock().await;
            if guard.state == PlayerState::Offline || guard.router.is_none() {
                continue;
            }
            if guard.tick_heartbeat() {
                to_kick.push(conn_id);
            } else if let Some(router) = &guard.router {
                let _ = router.notify("Heartbeat", Vec::new());
            }
        }
        to_kick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_router() -> Arc<Router> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Arc::new(Router::new(tx))
    }

    #[tokio::test]
    async fn fresh_admit_registers_player() {
        let mut users = UserManager::new();
        let account = Account {
            id: PlayerId(1),
            password_hash: String::new(),
            salt: String::new(),
            banned: false,
            avatar: "liubei".into(),
            total_game_time: 0,
        };
        let outcome = users
            .admit(&account, ConnId(1000), "alice".into(), "uuid-1".into(), test_router())
            .await;
        assert!(matches!(outcome, AdmitOutcome::Fresh(_)));
        assert!(users.find_player(PlayerId(1)).is_some());
        assert_eq!(users.online_count(), 1);
    }

    #[tokio::test]
    async fn remove_conn_drops_non_gameplay_player() {
        let mut users = UserManager::new();
        let account = Account {
            id: PlayerId(1),
            password_hash: String::new(),
            salt: String::new(),
            banned: false,
            avatar: "liubei".into(),
            total_game_time: 0,
        };
        users.admit(&account, ConnId(1000), "alice".into(), "uuid-1".into(), test_router()).await;
        users.remove_conn(ConnId(1000)).await;
        assert!(users.find_player(PlayerId(1)).is_none());
    }

    #[tokio::test]
    async fn robots_get_negative_ids() {
        let mut users = UserManager::new();
        let r1 = users.create_robot(cardforge_protocol::RoomId(5));
        let r2 = users.create_robot(cardforge_protocol::RoomId(5));
        assert!(r1.lock().await.id.0 < 0);
        assert_ne!(r1.lock().await.id, r2.lock().await.id);
    }
}
