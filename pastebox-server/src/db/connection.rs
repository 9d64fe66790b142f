//! Connection manager
//!
//! Every statement goes through [`ConnectionManager::with_connection`]:
//! acquire one lease, run the work under the statement timeout, release.
//! The lease is a guard, so the connection goes back to the pool on every
//! exit path, including when the caller's future is dropped mid-query.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgRow;
use sqlx::query::Query;
use sqlx::sqlite::SqliteRow;
use sqlx::{Database, Encode, FromRow, Postgres, Sqlite, Type};

use super::error::{ConnectionError, DbError, QueryError};
use super::pool::{create_pool_with_options, BackendKind, BackendPool, PoolSettings};

/// Default upper bound on a single statement.
pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Limits applied by the connection manager.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub pool: PoolSettings,
    pub statement_timeout: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            pool: PoolSettings::default(),
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
        }
    }
}

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Text(String),
    Bool(bool),
    BigInt(Option<i64>),
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Self::BigInt(Some(v))
    }
}

impl From<Option<i64>> for Param {
    fn from(v: Option<i64>) -> Self {
        Self::BigInt(v)
    }
}

/// Whether a statement yields rows or a row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Fetch,
    Command,
}

/// One parameterized SQL statement, placeholders written `$1, $2, ...`.
#[derive(Debug, Clone)]
pub struct Statement {
    sql: &'static str,
    kind: StatementKind,
    params: Vec<Param>,
}

impl Statement {
    /// A statement returning a result set.
    pub fn fetch(sql: &'static str) -> Self {
        Self {
            sql,
            kind: StatementKind::Fetch,
            params: Vec::new(),
        }
    }

    /// A statement returning a row count.
    pub fn command(sql: &'static str) -> Self {
        Self {
            sql,
            kind: StatementKind::Command,
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, param: impl Into<Param>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn sql(&self) -> &'static str {
        self.sql
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    async fn run(self, conn: &mut LeasedConnection) -> Result<Outcome, sqlx::Error> {
        let Statement { sql, kind, params } = self;
        match conn {
            LeasedConnection::Postgres(conn) => {
                let query = bind_params(sqlx::query::<Postgres>(sql), params);
                match kind {
                    StatementKind::Fetch => {
                        let rows = query.fetch_all(&mut **conn).await?;
                        Ok(Outcome::Rows(rows.into_iter().map(Row::Postgres).collect()))
                    }
                    StatementKind::Command => {
                        let result = query.execute(&mut **conn).await?;
                        Ok(Outcome::Affected(result.rows_affected()))
                    }
                }
            }
            LeasedConnection::Sqlite(conn) => {
                let query = bind_params(sqlx::query::<Sqlite>(sql), params);
                match kind {
                    StatementKind::Fetch => {
                        let rows = query.fetch_all(&mut **conn).await?;
                        Ok(Outcome::Rows(rows.into_iter().map(Row::Sqlite).collect()))
                    }
                    StatementKind::Command => {
                        let result = query.execute(&mut **conn).await?;
                        Ok(Outcome::Affected(result.rows_affected()))
                    }
                }
            }
        }
    }
}

fn bind_params<'q, DB>(
    mut query: Query<'q, DB, DB::Arguments<'q>>,
    params: Vec<Param>,
) -> Query<'q, DB, DB::Arguments<'q>>
where
    DB: Database,
    String: Encode<'q, DB> + Type<DB>,
    bool: Encode<'q, DB> + Type<DB>,
    Option<i64>: Encode<'q, DB> + Type<DB>,
{
    for param in params {
        query = match param {
            Param::Text(v) => query.bind(v),
            Param::Bool(v) => query.bind(v),
            Param::BigInt(v) => query.bind(v),
        };
    }
    query
}

/// A row from either backend.
pub enum Row {
    Postgres(PgRow),
    Sqlite(SqliteRow),
}

// SqliteRow has no Debug impl; show the backend and column count only.
impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (backend, columns) = match self {
            Self::Postgres(row) => ("Postgres", sqlx::Row::len(row)),
            Self::Sqlite(row) => ("Sqlite", sqlx::Row::len(row)),
        };
        f.debug_struct("Row")
            .field("backend", &backend)
            .field("columns", &columns)
            .finish()
    }
}

impl Row {
    /// Map the row onto a typed record.
    pub fn decode<T>(&self) -> Result<T, QueryError>
    where
        T: for<'r> FromRow<'r, PgRow> + for<'r> FromRow<'r, SqliteRow>,
    {
        match self {
            Self::Postgres(row) => <T as FromRow<'_, PgRow>>::from_row(row),
            Self::Sqlite(row) => <T as FromRow<'_, SqliteRow>>::from_row(row),
        }
        .map_err(QueryError::Decode)
    }
}

/// Result of a single statement.
#[derive(Debug)]
pub enum Outcome {
    Rows(Vec<Row>),
    Affected(u64),
}

impl Outcome {
    /// Rows of a fetch statement; empty for commands.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::Rows(rows) => rows,
            Self::Affected(_) => Vec::new(),
        }
    }

    /// Row count of a command; the result-set length for fetches.
    pub fn rows_affected(&self) -> u64 {
        match self {
            Self::Rows(rows) => rows.len() as u64,
            Self::Affected(n) => *n,
        }
    }
}

/// A connection exclusively borrowed from the pool.
#[derive(Debug)]
pub enum LeasedConnection {
    Postgres(PoolConnection<Postgres>),
    Sqlite(PoolConnection<Sqlite>),
}

impl LeasedConnection {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Postgres(_) => BackendKind::Postgres,
            Self::Sqlite(_) => BackendKind::Sqlite,
        }
    }

    /// Close the connection when the lease ends instead of recycling it.
    fn close_on_drop(&mut self) {
        match self {
            Self::Postgres(conn) => conn.close_on_drop(),
            Self::Sqlite(conn) => conn.close_on_drop(),
        }
    }
}

/// Guard over a leased connection; decrements the outstanding count on drop,
/// after which the inner `PoolConnection` returns itself to the pool.
struct Lease {
    conn: LeasedConnection,
    outstanding: Arc<AtomicUsize>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Sole owner of the pool. Cloning shares the pool and the lease counter.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    pool: BackendPool,
    acquire_timeout: Duration,
    statement_timeout: Duration,
    outstanding: Arc<AtomicUsize>,
}

impl ConnectionManager {
    pub fn new(pool: BackendPool, settings: &ManagerSettings) -> Self {
        Self {
            pool,
            acquire_timeout: settings.pool.acquire_timeout,
            statement_timeout: settings.statement_timeout,
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Build the pool for `database_url` and wrap it.
    pub async fn connect(
        database_url: &str,
        settings: &ManagerSettings,
    ) -> Result<Self, ConnectionError> {
        let pool = create_pool_with_options(database_url, &settings.pool).await?;
        Ok(Self::new(pool, settings))
    }

    pub fn pool(&self) -> &BackendPool {
        &self.pool
    }

    pub fn kind(&self) -> BackendKind {
        self.pool.kind()
    }

    pub fn statement_timeout(&self) -> Duration {
        self.statement_timeout
    }

    /// Leases currently checked out through this manager (and its clones).
    pub fn leases_outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    async fn acquire(&self) -> Result<Lease, ConnectionError> {
        let conn = match &self.pool {
            BackendPool::Postgres(pool) => pool.acquire().await.map(LeasedConnection::Postgres),
            BackendPool::Sqlite(pool) => pool.acquire().await.map(LeasedConnection::Sqlite),
        }
        .map_err(|e| ConnectionError::from_acquire(e, self.acquire_timeout))?;

        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(Lease {
            conn,
            outstanding: Arc::clone(&self.outstanding),
        })
    }

    /// Run `work` on one leased connection.
    ///
    /// The lease is released before this returns, whatever the outcome. A
    /// statement that overruns the timeout gets its connection closed rather
    /// than handed to the next caller.
    pub async fn with_connection<T, F>(&self, work: F) -> Result<T, DbError>
    where
        F: for<'c> FnOnce(&'c mut LeasedConnection) -> BoxFuture<'c, Result<T, sqlx::Error>>,
    {
        let mut lease = self.acquire().await?;

        let result = tokio::time::timeout(self.statement_timeout, work(&mut lease.conn)).await;
        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(QueryError::Backend(e).into()),
            Err(_) => {
                lease.conn.close_on_drop();
                Err(QueryError::TimedOut(self.statement_timeout).into())
            }
        }
    }

    /// Run a single statement.
    pub async fn execute(&self, statement: Statement) -> Result<Outcome, DbError> {
        tracing::debug!(
            sql = statement.sql(),
            params = statement.params().len(),
            "executing statement"
        );
        self.with_connection(move |conn| Box::pin(statement.run(conn)))
            .await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use tempfile::TempDir;

    async fn scratch_table(manager: &ConnectionManager) {
        manager
            .execute(Statement::command(
                "CREATE TABLE scratch (id BIGINT PRIMARY KEY, label TEXT NOT NULL, flag BOOLEAN NOT NULL)",
            ))
            .await
            .expect("create table");
    }

    #[derive(Debug, sqlx::FromRow)]
    struct Scratch {
        id: i64,
        label: String,
        flag: bool,
    }

    #[tokio::test]
    async fn executes_commands_and_fetches() {
        let dir = TempDir::new().unwrap();
        let manager = sqlite_manager(&dir).await;
        scratch_table(&manager).await;

        let inserted = manager
            .execute(
                Statement::command("INSERT INTO scratch (id, label, flag) VALUES ($1, $2, $3)")
                    .bind(7_i64)
                    .bind("seven")
                    .bind(true),
            )
            .await
            .unwrap();
        assert_eq!(inserted.rows_affected(), 1);

        let rows = manager
            .execute(Statement::fetch("SELECT id, label, flag FROM scratch WHERE id = $1").bind(7_i64))
            .await
            .unwrap()
            .into_rows();
        assert_eq!(rows.len(), 1);

        assert_eq!(format!("{:?}", rows[0]), "Row { backend: \"Sqlite\", columns: 3 }");

        let row: Scratch = rows[0].decode().unwrap();
        assert_eq!(row.id, 7);
        assert_eq!(row.label, "seven");
        assert!(row.flag);
        assert_eq!(manager.leases_outstanding(), 0);
    }

    #[tokio::test]
    async fn exhausted_pool_is_connection_error() {
        let dir = TempDir::new().unwrap();
        let manager = ConnectionManager::connect(
            &sqlite_url(&dir),
            &settings(1, Duration::from_millis(100)),
        )
        .await
        .unwrap();
        let baseline = manager.pool().size();

        let held = manager.acquire().await.unwrap();
        assert_eq!(manager.leases_outstanding(), 1);

        let err = manager
            .execute(Statement::fetch("SELECT 1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Connection(ConnectionError::PoolTimedOut(_))
        ));
        assert_eq!(manager.leases_outstanding(), 1);

        drop(held);
        assert_eq!(manager.leases_outstanding(), 0);
        settle(manager.pool()).await;
        assert_eq!(manager.pool().size(), baseline);
    }

    #[tokio::test]
    async fn unreachable_backend_is_connection_error() {
        let settings = ManagerSettings {
            pool: PoolSettings {
                max_connections: 2,
                acquire_timeout: Duration::from_millis(500),
                lazy: true,
            },
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
        };
        // Port 1 is never a postgres server
        let manager = ConnectionManager::connect("postgres://pastebox@127.0.0.1:1/pastebox", &settings)
            .await
            .unwrap();

        let err = manager
            .execute(Statement::fetch("SELECT 1"))
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Connection(_)), "got {err:?}");
        assert_eq!(manager.leases_outstanding(), 0);
        assert_eq!(manager.pool().size(), 0);
    }

    #[tokio::test]
    async fn failed_statement_releases_connection() {
        let dir = TempDir::new().unwrap();
        let manager = sqlite_manager(&dir).await;
        settle(manager.pool()).await;
        let baseline = manager.pool().size();

        let err = manager
            .execute(Statement::command("INSERT INTO missing_table (id) VALUES ($1)").bind(1_i64))
            .await
            .unwrap_err();

        match err {
            DbError::Query(QueryError::Backend(e)) => {
                assert!(e.to_string().contains("missing_table"), "diagnostic lost: {e}")
            }
            other => panic!("expected backend query error, got {other:?}"),
        }
        assert_eq!(manager.leases_outstanding(), 0);
        settle(manager.pool()).await;
        assert_eq!(manager.pool().size(), baseline);
    }

    #[tokio::test]
    async fn work_error_releases_connection() {
        let dir = TempDir::new().unwrap();
        let manager = sqlite_manager(&dir).await;

        let err = manager
            .with_connection(|_conn| Box::pin(async { Err::<(), _>(sqlx::Error::RowNotFound) }))
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Query(QueryError::Backend(sqlx::Error::RowNotFound))));
        assert_eq!(manager.leases_outstanding(), 0);
        settle(manager.pool()).await;
    }

    #[tokio::test]
    async fn overrunning_statement_times_out() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(2, Duration::from_secs(1));
        settings.statement_timeout = Duration::from_millis(50);
        let manager = ConnectionManager::connect(&sqlite_url(&dir), &settings)
            .await
            .unwrap();

        let err = manager
            .with_connection(|_conn| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(())
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Query(QueryError::TimedOut(_))));
        assert_eq!(manager.leases_outstanding(), 0);
        settle(manager.pool()).await;

        // The pool still serves new work afterwards
        manager.execute(Statement::fetch("SELECT 1")).await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_caller_releases_lease() {
        let dir = TempDir::new().unwrap();
        let manager = sqlite_manager(&dir).await;

        let worker = manager.clone();
        let handle = tokio::spawn(async move {
            worker
                .with_connection(|_conn| {
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(())
                    })
                })
                .await
        });

        while manager.leases_outstanding() == 0 {
            tokio::task::yield_now().await;
        }
        handle.abort();
        let _ = handle.await;

        assert_eq!(manager.leases_outstanding(), 0);
        settle(manager.pool()).await;
    }

    #[tokio::test]
    async fn concurrent_statements_share_the_pool() {
        let dir = TempDir::new().unwrap();
        let manager = sqlite_manager(&dir).await;

        let handles: Vec<_> = (0..16_i64)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    let rows = manager
                        .execute(Statement::fetch("SELECT $1 AS n").bind(i))
                        .await
                        .expect("concurrent statement failed")
                        .into_rows();
                    rows.len()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.expect("task panicked"), 1);
        }
        assert_eq!(manager.leases_outstanding(), 0);
        assert!(manager.pool().size() <= 4);
    }

    #[tokio::test]
    async fn reports_unique_violation() {
        let dir = TempDir::new().unwrap();
        let manager = sqlite_manager(&dir).await;
        scratch_table(&manager).await;

        let insert = || {
            Statement::command("INSERT INTO scratch (id, label, flag) VALUES ($1, $2, $3)")
                .bind(1_i64)
                .bind("one")
                .bind(false)
        };
        manager.execute(insert()).await.unwrap();
        let err = manager.execute(insert()).await.unwrap_err();

        match err {
            DbError::Query(q) => {
                assert!(q.is_unique_violation());
                assert!(!q.is_transient());
            }
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn postgres_round_trip() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let manager = ConnectionManager::connect(&url, &ManagerSettings::default())
            .await
            .unwrap();

        let rows = manager
            .execute(Statement::fetch("SELECT $1::BIGINT AS n").bind(42_i64))
            .await
            .unwrap()
            .into_rows();

        assert_eq!(rows.len(), 1);
        assert_eq!(manager.leases_outstanding(), 0);
    }
}
