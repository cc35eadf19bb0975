//! The dedicated persistence-worker thread for the game-save database.
//!
//! Unlike the auth database (short queries, run inline on the main
//! reactor — see [`crate::auth_db::AuthDb`]), game saves can be larger
//! and are posted to a single dedicated OS thread running its own
//! single-threaded Tokio runtime, mirroring the source's `DbThread`
//! (a worker `io_context` plus `std::thread`, exposing `async_select`/
//! `async_exec` that post their result back to the caller).

use std::path::PathBuf;

use rusqlite::Connection;
use tokio::sync::{mpsc, oneshot};
use tracing::error;

use crate::error::PersistError;
use crate::value::SqlValue;

enum Command {
    Select { sql: String, reply: oneshot::Sender<Result<Vec<Vec<SqlValue>>, PersistError>> },
    Exec { sql: String, reply: oneshot::Sender<Result<usize, PersistError>> },
}

/// A handle to the background persistence thread. Cloning shares the
/// same worker; dropping the last handle lets the worker's channel
/// close and the thread exit.
#[derive(Clone)]
pub struct DbWorker {
    tx: mpsc::UnboundedSender<Command>,
}

impl DbWorker {
    /// Spawns the worker thread, opening `db_path` and running `init_sql`
    /// (if given) once before accepting commands.
    pub fn spawn(db_path: impl Into<PathBuf>, init_sql: Option<String>, thread_name: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let db_path = db_path.into();
        std::thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("persistence worker runtime");
                rt.block_on(run(db_path, init_sql, rx));
            })
            .expect("spawn persistence worker thread");
        DbWorker { tx }
    }

    pub async fn async_select(&self, sql: impl Into<String>) -> Result<Vec<Vec<SqlValue>>, PersistError> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Select { sql: sql.into(), reply })
            .map_err(|_| PersistError::WorkerGone)?;
        reply_rx.await.map_err(|_| PersistError::WorkerGone)?
    }

    pub async fn async_exec(&self, sql: impl Into<String>) -> Result<usize, PersistError> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Exec { sql: sql.into(), reply })
            .map_err(|_| PersistError::WorkerGone)?;
        reply_rx.await.map_err(|_| PersistError::WorkerGone)?
    }
}

async fn run(db_path: PathBuf, init_sql: Option<String>, mut rx: mpsc::UnboundedReceiver<Command>) {
    let conn = match Connection::open(&db_path) {
        Ok(conn) => conn,
        Err(e) => {
            error!(error = %e, path = %db_path.display(), "persistence worker failed to open database");
            return;
        }
    };
    if let Some(sql) = init_sql {
        if let Err(e) = conn.execute_batch(&sql) {
            error!(error = %e, "persistence worker init SQL failed");
        }
    }

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Select { sql, reply } => {
                let result = select(&conn, &sql);
                let _ = reply.send(result);
            }
            Command::Exec { sql, reply } => {
                let result = conn.execute(&sql, []).map_err(PersistError::from);
                let _ = reply.send(result);
            }
        }
    }
}

fn select(conn: &Connection, sql: &str) -> Result<Vec<Vec<SqlValue>>, PersistError> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exec_then_select_round_trips() {
        let worker = DbWorker::spawn(
            ":memory:",
            Some("CREATE TABLE globalSaves (uid INTEGER, key TEXT, data BLOB);".into()),
            "test-db-worker",
        );
        worker
            .async_exec("INSERT INTO globalSaves (uid, key, data) VALUES (0, 'foo', X'7b7d')")
            .await
            .unwrap();
        let rows = worker.async_select("SELECT data FROM globalSaves WHERE key = 'foo'").await.unwrap();
        assert_eq!(rows.len(), 1);
        match &rows[0][0] {
            SqlValue::Blob(b) => assert_eq!(b, b"{}"),
            other => panic!("unexpected value: {other:?}"),
        }
    }
}
