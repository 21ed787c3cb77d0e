use std::io::ErrorKind;

use sqlx::mysql::MySqlDatabaseError;

/// Failure of a single data-layer operation.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Pool exhausted, host unreachable, handshake refused.
    #[error("connection unavailable: {0}")]
    Connection(#[source] sqlx::Error),

    /// Malformed statement or constraint violation.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// Unique key already taken, e.g. a second insert of the same player uuid.
    #[error("duplicate key: {0}")]
    Conflict(String),

    /// A column held something we cannot represent (e.g. a malformed uuid).
    #[error("bad column value: {0}")]
    Decode(String),

    /// The worker task was aborted or panicked before completing.
    #[error("database task failed: {0}")]
    Task(String),
}

impl DbError {
    /// True for connectivity failures worth retrying: pool timeouts and
    /// dropped or timed-out sockets. Bad credentials, unknown databases and
    /// TLS/config problems will not fix themselves.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Connection(e) => match e {
                sqlx::Error::PoolTimedOut => true,
                sqlx::Error::Io(io) => matches!(
                    io.kind(),
                    ErrorKind::TimedOut
                        | ErrorKind::ConnectionReset
                        | ErrorKind::ConnectionAborted
                        | ErrorKind::Interrupted
                        | ErrorKind::UnexpectedEof
                ),
                _ => false,
            },
            _ => false,
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, DbError::Connection(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::Conflict(_))
    }
}

impl From<sqlx::Error> for DbError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => DbError::Connection(e),
            // 1045 access denied, 1049 unknown database, 2002/2003 cannot connect
            sqlx::Error::Database(ref db)
                if db
                    .try_downcast_ref::<MySqlDatabaseError>()
                    .is_some_and(|my| matches!(my.number(), 1045 | 1049 | 2002 | 2003)) =>
            {
                DbError::Connection(e)
            }
            sqlx::Error::Database(ref db) if db.is_unique_violation() => DbError::Conflict(db.message().to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => DbError::Decode(e.to_string()),
            other => DbError::Query(other),
        }
    }
}

impl From<uuid::Error> for DbError {
    fn from(e: uuid::Error) -> Self {
        DbError::Decode(e.to_string())
    }
}
