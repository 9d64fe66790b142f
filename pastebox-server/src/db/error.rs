//! Error types for the connection layer
//!
//! Acquisition and execution failures are kept apart so callers can tell
//! "never reached the backend" from "the backend rejected the statement".

use std::time::Duration;

/// Failure to obtain a connection lease from the pool.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("no connection available within {0:?} (pool exhausted)")]
    PoolTimedOut(Duration),

    #[error("connection pool is closed")]
    PoolClosed,

    #[error("backend unreachable: {0}")]
    Unreachable(#[source] sqlx::Error),

    #[error("unsupported database url scheme: '{0}'")]
    UnsupportedUrl(String),
}

impl ConnectionError {
    /// Classify an error raised while acquiring a lease.
    pub(crate) fn from_acquire(err: sqlx::Error, acquire_timeout: Duration) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Self::PoolTimedOut(acquire_timeout),
            sqlx::Error::PoolClosed => Self::PoolClosed,
            other => Self::Unreachable(other),
        }
    }

    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::UnsupportedUrl(_) | Self::PoolClosed)
    }
}

/// Failure while running a statement on a leased connection.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The backend rejected or failed the statement. Carries the driver's
    /// diagnostic untouched.
    #[error("statement failed: {0}")]
    Backend(#[source] sqlx::Error),

    #[error("statement did not complete within {0:?}")]
    TimedOut(Duration),

    #[error("could not map row: {0}")]
    Decode(#[source] sqlx::Error),
}

impl QueryError {
    /// True when the backend reported a unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Backend(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            Self::TimedOut(_) => true,
            Self::Backend(sqlx::Error::Io(_)) => true,
            Self::Backend(sqlx::Error::Database(db)) => matches!(
                db.code().as_deref(),
                // serialization_failure, deadlock_detected, SQLITE_BUSY,
                // SQLITE_LOCKED, SQLITE_BUSY_RECOVERY, SQLITE_BUSY_SNAPSHOT
                Some("40001" | "40P01" | "5" | "6" | "261" | "517")
            ),
            _ => false,
        }
    }
}

/// Error returned by the connection manager.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl DbError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_transient(),
            Self::Query(e) => e.is_transient(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_timeout_is_pool_exhaustion() {
        let err = ConnectionError::from_acquire(sqlx::Error::PoolTimedOut, Duration::from_millis(250));
        assert!(matches!(err, ConnectionError::PoolTimedOut(d) if d == Duration::from_millis(250)));
        assert!(err.is_transient());
    }

    #[test]
    fn closed_pool_is_permanent() {
        let err = ConnectionError::from_acquire(sqlx::Error::PoolClosed, Duration::from_secs(1));
        assert!(matches!(err, ConnectionError::PoolClosed));
        assert!(!DbError::from(err).is_transient());
    }

    #[test]
    fn io_failure_is_unreachable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = ConnectionError::from_acquire(sqlx::Error::Io(io), Duration::from_secs(1));
        assert!(matches!(err, ConnectionError::Unreachable(_)));
    }

    #[derive(Debug)]
    struct CodedError(&'static str);

    impl std::fmt::Display for CodedError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "database error {}", self.0)
        }
    }

    impl std::error::Error for CodedError {}

    impl sqlx::error::DatabaseError for CodedError {
        fn message(&self) -> &str {
            "database error"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(self.0.into())
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    fn with_code(code: &'static str) -> QueryError {
        QueryError::Backend(sqlx::Error::Database(Box::new(CodedError(code))))
    }

    #[test]
    fn lock_contention_codes_are_transient() {
        for code in ["40001", "40P01", "5", "6", "261", "517"] {
            assert!(with_code(code).is_transient(), "{code} should be transient");
        }
    }

    #[test]
    fn constraint_codes_are_permanent() {
        // SQLITE_CONSTRAINT_PRIMARYKEY, unique_violation
        for code in ["1555", "23505"] {
            assert!(!with_code(code).is_transient(), "{code} should be permanent");
        }
    }

    #[test]
    fn statement_timeout_is_transient() {
        let err = DbError::from(QueryError::TimedOut(Duration::from_secs(10)));
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "statement did not complete within 10s");
    }
}
