//! Error types for the persistence worker.

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("persistence worker is shutting down")]
    WorkerGone,

    #[error("refused unsafe identifier: {0}")]
    UnsafeIdentifier(String),
}
