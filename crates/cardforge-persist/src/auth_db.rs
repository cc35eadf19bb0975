//! The main auth database: `userinfo`, `usergameinfo`, `uuidinfo`,
//! `banuuid`, `whitelist`, `tempmute`.
//!
//! Per §5's concurrency model these are short queries and run directly
//! on the main reactor rather than through the dedicated persistence
//! worker — `AuthDb` just wraps a `Connection` behind a `tokio::sync::Mutex`
//! so it can be shared by `Arc` across the server's async tasks.

use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::error::PersistError;
use crate::value::SqlValue;

pub struct AuthDb {
    conn: Mutex<Connection>,
    /// Serializes `BEGIN`/`COMMIT` pairs; nested transactions aren't
    /// supported, matching the source's single mutex-guarded pair.
    transaction_lock: Mutex<()>,
}

impl AuthDb {
    pub fn open(path: impl AsRef<std::path::Path>, init_sql: Option<&str>) -> Result<Self, PersistError> {
        let conn = Connection::open(path)?;
        if let Some(sql) = init_sql {
            conn.execute_batch(sql)?;
        }
        Ok(AuthDb { conn: Mutex::new(conn), transaction_lock: Mutex::new(()) })
    }

    pub async fn exec(&self, sql: &str) -> Result<usize, PersistError> {
        let conn = self.conn.lock().await;
        Ok(conn.execute(sql, [])?)
    }

    /// Runs an `INSERT` and returns `last_insert_rowid()` from the same
    /// locked connection, so no other statement on this handle can land
    /// between the insert and the rowid read.
    pub async fn insert_and_get_rowid(&self, sql: &str) -> Result<i64, PersistError> {
        let conn = self.conn.lock().await;
        conn.execute(sql, [])?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn select(&self, sql: &str) -> Result<Vec<Vec<SqlValue>>, PersistError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(sql)?;
        let column_count = stmt.column_count();
        let rows = stmt.query_map([], |row| {
            let mut out = Vec::with_capacity(column_count);
            for i in 0..column_count {
                out.push(SqlValue::from(row.get_ref(i)?));
            }
            Ok(out)
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(PersistError::from)
    }

    /// Holds the transaction lock for the duration of `f`, issuing
    /// `BEGIN;` before and `COMMIT;` after.
    pub async fn with_transaction<F, Fut, T>(&self, f: F) -> Result<T, PersistError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, PersistError>>,
    {
        let _guard = self.transaction_lock.lock().await;
        self.exec("BEGIN;").await?;
        match f().await {
            Ok(value) => {
                self.exec("COMMIT;").await?;
                Ok(value)
            }
            Err(e) => {
                let _ = self.exec("ROLLBACK;").await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exec_and_select_round_trip() {
        let db = AuthDb::open(
            ":memory:",
            Some("CREATE TABLE userinfo (id INTEGER PRIMARY KEY, name TEXT);"),
        )
        .unwrap();
        db.exec("INSERT INTO userinfo (id, name) VALUES (1, 'alice')").await.unwrap();
        let rows = db.select("SELECT name FROM userinfo WHERE id = 1").await.unwrap();
        assert_eq!(rows[0][0].as_text(), Some("alice"));
    }

    #[tokio::test]
    async fn transaction_commits_on_success() {
        let db = AuthDb::open(
            ":memory:",
            Some("CREATE TABLE userinfo (id INTEGER PRIMARY KEY, name TEXT);"),
        )
        .unwrap();
        db.with_transaction(|| async {
            db.exec("INSERT INTO userinfo (id, name) VALUES (2, 'bob')").await?;
            Ok(())
        })
        .await
        .unwrap();
        let rows = db.select("SELECT name FROM userinfo WHERE id = 2").await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
