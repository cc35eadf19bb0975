//! Concrete persistence-backed implementations of the trait seams each
//! downstream crate defines: [`AccountStore`], [`ChatStore`], [`StatsStore`].
//!
//! Account and mute state live in the auth database and are short,
//! latency-sensitive queries, so they go through [`AuthDb`] directly on
//! the caller's reactor. Game saves are larger and go through the
//! dedicated [`DbWorker`] thread instead (§4.10, §5).
//!
//! Every externally-supplied name (screen name, device uuid, IP, save
//! key) is checked with [`is_safe_identifier`] before it is spliced into
//! SQL text; values that are themselves arbitrary bytes (save-state
//! JSON) are embedded as hex literals instead of quoted strings.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use cardforge_persist::hygiene::{is_safe_identifier, to_hex_literal};
use cardforge_persist::{AuthDb, DbWorker};
use cardforge_protocol::PlayerId;
use cardforge_room::{PersistenceError, RoomError, StatsStore};
use cardforge_session::{Account, AccountStore, SessionError};

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn require_safe(s: &str) -> Result<(), SessionError> {
    if is_safe_identifier(s) {
        Ok(())
    } else {
        Err(SessionError::Persistence(format!("unsafe value: {s:?}")))
    }
}

/// Account registry backed by `userinfo` / `usergameinfo` / `uuidinfo` /
/// `banuuid` / `whitelist` in the auth database.
pub struct SqlAccountStore {
    db: Arc<AuthDb>,
}

impl SqlAccountStore {
    pub fn new(db: Arc<AuthDb>) -> Self {
        Self { db }
    }
}

impl AccountStore for SqlAccountStore {
    async fn find_by_name(&self, screen_name: &str) -> Result<Option<Account>, SessionError> {
        require_safe(screen_name)?;
        let rows = self
            .db
            .select(&format!(
                "SELECT userinfo.id, userinfo.password, userinfo.salt, userinfo.banned, \
                 userinfo.avatar, usergameinfo.totalGameTime \
                 FROM userinfo LEFT JOIN usergameinfo ON usergameinfo.id = userinfo.id \
                 WHERE userinfo.name = '{screen_name}'"
            ))
            .await
            .map_err(|e| SessionError::Persistence(e.to_string()))?;

        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        Ok(Some(Account {
            id: PlayerId(row[0].as_integer().unwrap_or(0)),
            password_hash: row[1].as_text().unwrap_or_default().to_string(),
            salt: row[2].as_text().unwrap_or_default().to_string(),
            banned: row[3].as_integer().unwrap_or(0) != 0,
            avatar: row[4].as_text().unwrap_or_default().to_string(),
            total_game_time: row[5].as_integer().unwrap_or(0) as u64,
        }))
    }

    async fn create(
        &self,
        screen_name: &str,
        password_hash: &str,
        salt: &str,
    ) -> Result<Account, SessionError> {
        require_safe(screen_name)?;
        require_safe(password_hash)?;
        require_safe(salt)?;

        let id = self
            .db
            .insert_and_get_rowid(&format!(
                "INSERT INTO userinfo (name, password, salt, avatar, lastLoginIp, banned) \
                 VALUES ('{screen_name}', '{password_hash}', '{salt}', 'liubei', '', 0)"
            ))
            .await
            .map_err(|e| SessionError::Persistence(e.to_string()))?;

        let now = now_secs();
        self.db
            .exec(&format!(
                "INSERT INTO usergameinfo \
                 (id, registerTime, lastLoginTime, totalGameTime, totalGames, winCount, runCount) \
                 VALUES ({id}, {now}, {now}, 0, 0, 0, 0)"
            ))
            .await
            .map_err(|e| SessionError::Persistence(e.to_string()))?;

        Ok(Account {
            id: PlayerId(id),
            password_hash: password_hash.to_string(),
            salt: salt.to_string(),
            banned: false,
            avatar: "liubei".to_string(),
            total_game_time: 0,
        })
    }

    async fn count_for_uuid(&self, uuid: &str) -> Result<u32, SessionError> {
        require_safe(uuid)?;
        let rows = self
            .db
            .select(&format!(
                "SELECT COUNT(DISTINCT id) FROM uuidinfo WHERE uuid = '{uuid}'"
            ))
            .await
            .map_err(|e| SessionError::Persistence(e.to_string()))?;
        Ok(rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.as_integer())
            .unwrap_or(0) as u32)
    }

    async fn is_uuid_banned(&self, uuid: &str) -> Result<bool, SessionError> {
        require_safe(uuid)?;
        let rows = self
            .db
            .select(&format!("SELECT COUNT(*) FROM banuuid WHERE uuid = '{uuid}'"))
            .await
            .map_err(|e| SessionError::Persistence(e.to_string()))?;
        Ok(rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.as_integer())
            .unwrap_or(0)
            > 0)
    }

    async fn is_name_whitelisted(&self, screen_name: &str) -> Result<bool, SessionError> {
        require_safe(screen_name)?;
        let rows = self
            .db
            .select(&format!(
                "SELECT COUNT(*) FROM whitelist WHERE name = '{screen_name}'"
            ))
            .await
            .map_err(|e| SessionError::Persistence(e.to_string()))?;
        Ok(rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.as_integer())
            .unwrap_or(0)
            > 0)
    }

    async fn upsert_uuid(&self, id: PlayerId, uuid: &str) -> Result<(), SessionError> {
        require_safe(uuid)?;
        self.db
            .exec(&format!(
                "INSERT OR IGNORE INTO uuidinfo (id, uuid) VALUES ({}, '{uuid}')",
                id.0
            ))
            .await
            .map_err(|e| SessionError::Persistence(e.to_string()))?;
        Ok(())
    }

    async fn record_login(&self, id: PlayerId, ip: &str) -> Result<(), SessionError> {
        require_safe(ip)?;
        let now = now_secs();
        self.db
            .exec(&format!(
                "UPDATE userinfo SET lastLoginIp = '{ip}' WHERE id = {}",
                id.0
            ))
            .await
            .map_err(|e| SessionError::Persistence(e.to_string()))?;
        self.db
            .exec(&format!(
                "UPDATE usergameinfo SET lastLoginTime = {now} WHERE id = {}",
                id.0
            ))
            .await
            .map_err(|e| SessionError::Persistence(e.to_string()))?;
        Ok(())
    }
}

impl SqlAccountStore {
    /// `UpdateAvatar` (§4.6): the caller has already checked the new value
    /// is a safe, non-empty string.
    pub async fn update_avatar(&self, id: PlayerId, avatar: &str) -> Result<(), SessionError> {
        require_safe(avatar)?;
        self.db
            .exec(&format!("UPDATE userinfo SET avatar = '{avatar}' WHERE id = {}", id.0))
            .await
            .map_err(|e| SessionError::Persistence(e.to_string()))?;
        Ok(())
    }

    /// `UpdatePassword` (§4.6): stores a freshly hashed password and salt.
    /// The caller has already verified the old password hash matches.
    pub async fn update_password(
        &self,
        id: PlayerId,
        new_hash: &str,
        new_salt: &str,
    ) -> Result<(), SessionError> {
        require_safe(new_hash)?;
        require_safe(new_salt)?;
        self.db
            .exec(&format!(
                "UPDATE userinfo SET password = '{new_hash}', salt = '{new_salt}' WHERE id = {}",
                id.0
            ))
            .await
            .map_err(|e| SessionError::Persistence(e.to_string()))?;
        Ok(())
    }
}

/// Temporary-mute lookups against the `tempmute` table. Expired rows are
/// deleted on every read, matching the source's lazy-expiry behavior.
pub struct SqlChatStore {
    db: Arc<AuthDb>,
}

impl SqlChatStore {
    pub fn new(db: Arc<AuthDb>) -> Self {
        Self { db }
    }
}

impl cardforge_room::ChatStore for SqlChatStore {
    async fn mute_status(&self, player_id: PlayerId) -> Result<cardforge_room::MuteStatus, RoomError> {
        let now = now_secs();
        self.db
            .exec(&format!("DELETE FROM tempmute WHERE expireAt <= {now}"))
            .await
            .map_err(|e| PersistenceError(e.to_string()))?;

        let rows = self
            .db
            .select(&format!(
                "SELECT type FROM tempmute WHERE uid = {} ORDER BY type DESC LIMIT 1",
                player_id.0
            ))
            .await
            .map_err(|e| PersistenceError(e.to_string()))?;

        Ok(match rows.first().and_then(|row| row.first()).and_then(|v| v.as_integer()) {
            Some(2) => cardforge_room::MuteStatus::NoCommands,
            Some(1) => cardforge_room::MuteStatus::Full,
            _ => cardforge_room::MuteStatus::None,
        })
    }
}

/// Win-rate bookkeeping and global state, split across the auth database
/// (per-account aggregate counters) and the game-save worker (arbitrary
/// JSON blobs).
pub struct SqlStatsStore {
    auth_db: Arc<AuthDb>,
    game_db: DbWorker,
}

impl SqlStatsStore {
    pub fn new(auth_db: Arc<AuthDb>, game_db: DbWorker) -> Self {
        Self { auth_db, game_db }
    }
}

impl StatsStore for SqlStatsStore {
    async fn record_player_result(
        &self,
        player_id: PlayerId,
        _mode: &str,
        won: bool,
        runned: bool,
    ) -> Result<(), RoomError> {
        // usergameinfo keeps one aggregate row per account; per-mode
        // breakdown isn't tracked, matching the source's flat schema.
        self.auth_db
            .exec(&format!(
                "UPDATE usergameinfo SET totalGames = totalGames + 1, \
                 winCount = winCount + {}, runCount = runCount + {} WHERE id = {}",
                won as i32,
                runned as i32,
                player_id.0
            ))
            .await
            .map_err(|e| PersistenceError(e.to_string()))?;
        Ok(())
    }

    async fn record_general_result(
        &self,
        general: &str,
        mode: &str,
        role: &str,
        won: bool,
    ) -> Result<(), RoomError> {
        if !is_safe_identifier(general) || !is_safe_identifier(mode) || !is_safe_identifier(role) {
            return Err(PersistenceError(format!(
                "unsafe general win-rate key: {general:?}/{mode:?}/{role:?}"
            ))
            .into());
        }

        let existing = self
            .auth_db
            .select(&format!(
                "SELECT totalGames, winCount FROM generalWinRate \
                 WHERE general = '{general}' AND mode = '{mode}' AND role = '{role}'"
            ))
            .await
            .map_err(|e| PersistenceError(e.to_string()))?;

        if let Some(row) = existing.first() {
            let total_games = row[0].as_integer().unwrap_or(0) + 1;
            let win_count = row[1].as_integer().unwrap_or(0) + won as i64;
            self.auth_db
                .exec(&format!(
                    "UPDATE generalWinRate SET totalGames = {total_games}, winCount = {win_count} \
                     WHERE general = '{general}' AND mode = '{mode}' AND role = '{role}'"
                ))
                .await
                .map_err(|e| PersistenceError(e.to_string()))?;
        } else {
            self.auth_db
                .exec(&format!(
                    "INSERT INTO generalWinRate (general, mode, role, totalGames, winCount) \
                     VALUES ('{general}', '{mode}', '{role}', 1, {})",
                    won as i32
                ))
                .await
                .map_err(|e| PersistenceError(e.to_string()))?;
        }
        Ok(())
    }

    async fn save_global_state(&self, key: &str, data: &[u8]) -> Result<(), RoomError> {
        if !is_safe_identifier(key) {
            return Err(PersistenceError(format!("unsafe global state key: {key:?}")).into());
        }
        let literal = to_hex_literal(data);
        self.game_db
            .async_exec(format!(
                "INSERT OR REPLACE INTO globalSaves (uid, key, data) VALUES (0, '{key}', {literal})"
            ))
            .await
            .map_err(|e| PersistenceError(e.to_string()))?;
        Ok(())
    }

    async fn load_global_state(&self, key: &str) -> Result<Vec<u8>, RoomError> {
        if !is_safe_identifier(key) {
            return Err(PersistenceError(format!("unsafe global state key: {key:?}")).into());
        }
        let rows = self
            .game_db
            .async_select(format!(
                "SELECT data FROM globalSaves WHERE uid = 0 AND key = '{key}'"
            ))
            .await
            .map_err(|e| PersistenceError(e.to_string()))?;
        Ok(rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.as_blob())
            .map(|b| b.to_vec())
            .unwrap_or_else(|| b"{}".to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTH_INIT: &str = "
        CREATE TABLE userinfo (id INTEGER PRIMARY KEY, name TEXT, password TEXT, salt TEXT, avatar TEXT, lastLoginIp TEXT, banned INTEGER);
        CREATE TABLE usergameinfo (id INTEGER PRIMARY KEY, registerTime INTEGER, lastLoginTime INTEGER, totalGameTime INTEGER, totalGames INTEGER, winCount INTEGER, runCount INTEGER);
        CREATE TABLE uuidinfo (id INTEGER, uuid TEXT);
        CREATE TABLE banuuid (uuid TEXT);
        CREATE TABLE whitelist (name TEXT);
        CREATE TABLE tempmute (uid INTEGER, expireAt INTEGER, type INTEGER);
        CREATE TABLE generalWinRate (general TEXT, mode TEXT, role TEXT, totalGames INTEGER, winCount INTEGER);
    ";

    #[tokio::test]
    async fn create_then_find_round_trips() {
        let db = Arc::new(AuthDb::open(":memory:", Some(AUTH_INIT)).unwrap());
        let store = SqlAccountStore::new(db);

        let created = store.create("alice", "hash123", "salt456").await.unwrap();
        let found = store.find_by_name("alice").await.unwrap().unwrap();

        assert_eq!(found.id, created.id);
        assert_eq!(found.password_hash, "hash123");
        assert_eq!(found.avatar, "liubei");
        assert!(!found.banned);
    }

    #[tokio::test]
    async fn find_by_name_returns_none_for_unknown_account() {
        let db = Arc::new(AuthDb::open(":memory:", Some(AUTH_INIT)).unwrap());
        let store = SqlAccountStore::new(db);
        assert!(store.find_by_name("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unsafe_screen_name_is_rejected() {
        let db = Arc::new(AuthDb::open(":memory:", Some(AUTH_INIT)).unwrap());
        let store = SqlAccountStore::new(db);
        let result = store.find_by_name("a'; DROP TABLE userinfo; --").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn mute_status_reports_full_mute() {
        let db = Arc::new(AuthDb::open(":memory:", Some(AUTH_INIT)).unwrap());
        db.exec("INSERT INTO tempmute (uid, expireAt, type) VALUES (7, 9999999999, 1)")
            .await
            .unwrap();
        let store = SqlChatStore::new(db);
        let status = cardforge_room::ChatStore::mute_status(&store, PlayerId(7))
            .await
            .unwrap();
        assert!(matches!(status, cardforge_room::MuteStatus::Full));
    }

    #[tokio::test]
    async fn mute_status_expires_old_rows() {
        let db = Arc::new(AuthDb::open(":memory:", Some(AUTH_INIT)).unwrap());
        db.exec("INSERT INTO tempmute (uid, expireAt, type) VALUES (7, 1, 1)")
            .await
            .unwrap();
        let store = SqlChatStore::new(db);
        let status = cardforge_room::ChatStore::mute_status(&store, PlayerId(7))
            .await
            .unwrap();
        assert!(matches!(status, cardforge_room::MuteStatus::None));
    }

    #[tokio::test]
    async fn general_win_rate_accumulates_across_calls() {
        let db = Arc::new(AuthDb::open(":memory:", Some(AUTH_INIT)).unwrap());
        let game_db = DbWorker::spawn(
            ":memory:",
            Some("CREATE TABLE globalSaves (uid INTEGER, key TEXT, data BLOB);".to_string()),
            "test-stats-worker",
        );
        let store = SqlStatsStore::new(db, game_db);
        store.record_general_result("zhaoyun", "classic", "wei", true).await.unwrap();
        store.record_general_result("zhaoyun", "classic", "wei", false).await.unwrap();

        let rows = store
            .auth_db
            .select("SELECT totalGames, winCount FROM generalWinRate WHERE general = 'zhaoyun'")
            .await
            .unwrap();
        assert_eq!(rows[0][0].as_integer(), Some(2));
        assert_eq!(rows[0][1].as_integer(), Some(1));
    }

    #[tokio::test]
    async fn global_state_round_trips() {
        let db = Arc::new(AuthDb::open(":memory:", Some(AUTH_INIT)).unwrap());
        let game_db = DbWorker::spawn(
            ":memory:",
            Some("CREATE TABLE globalSaves (uid INTEGER, key TEXT, data BLOB);".to_string()),
            "test-stats-worker-2",
        );
        let store = SqlStatsStore::new(db, game_db);
        store.save_global_state("banlist", br#"{"banned":[]}"#).await.unwrap();
        let loaded = store.load_global_state("banlist").await.unwrap();
        assert_eq!(loaded, br#"{"banned":[]}"#);
    }

    #[tokio::test]
    async fn update_avatar_persists() {
        let db = Arc::new(AuthDb::open(":memory:", Some(AUTH_INIT)).unwrap());
        let store = SqlAccountStore::new(db);
        let created = store.create("alice", "hash123", "salt456").await.unwrap();
        store.update_avatar(created.id, "zhaoyun").await.unwrap();
        let found = store.find_by_name("alice").await.unwrap().unwrap();
        assert_eq!(found.avatar, "zhaoyun");
    }

    #[tokio::test]
    async fn update_password_persists_new_hash_and_salt() {
        let db = Arc::new(AuthDb::open(":memory:", Some(AUTH_INIT)).unwrap());
        let store = SqlAccountStore::new(db);
        let created = store.create("alice", "hash123", "salt456").await.unwrap();
        store.update_password(created.id, "newhash", "newsalt").await.unwrap();
        let found = store.find_by_name("alice").await.unwrap().unwrap();
        assert_eq!(found.password_hash, "newhash");
        assert_eq!(found.salt, "newsalt");
    }

    #[tokio::test]
    async fn missing_global_state_defaults_to_empty_object() {
        let db = Arc::new(AuthDb::open(":memory:", Some(AUTH_INIT)).unwrap());
        let game_db = DbWorker::spawn(
            ":memory:",
            Some("CREATE TABLE globalSaves (uid INTEGER, key TEXT, data BLOB);".to_string()),
            "test-stats-worker-3",
        );
        let store = SqlStatsStore::new(db, game_db);
        assert_eq!(store.load_global_state("nope").await.unwrap(), b"{}".to_vec());
    }
}
