//! Document store
//!
//! Translates document operations into single parameterized statements run
//! through the [`ConnectionManager`]. The store never touches the pool.
//!
//! Expiration is lazy: every read filters on the liveness predicate
//! `expiration IS NULL OR expiration > now`, with `now` taken from the
//! store's clock when the call is made. Keys are unique among live
//! documents; an expired row's key can be claimed again by a later `put`.

pub mod error;

use std::time::Duration;

use chrono::Utc;
use sqlx::FromRow;
use tracing::instrument;

use crate::db::{ConnectionManager, DbError, QueryError, Statement};
use crate::models::{
    Document, DocumentKey, Expiry, NewDocument, Paginated, Pagination, PutOptions,
};

pub use error::{Operation, StoreError};

/// Default retention window applied when `put` gets no explicit expiration.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(100_000);

/// Insert, or take over the key of an expired row. A live row with the same
/// key leaves the statement with zero affected rows.
const INSERT_DOCUMENT: &str = r#"
    INSERT INTO entries (key, text, public, name, title, expiration)
    VALUES ($1, $2, $3, $4, $5, $6)
    ON CONFLICT (key) DO UPDATE
    SET text = excluded.text,
        public = excluded.public,
        name = excluded.name,
        title = excluded.title,
        expiration = excluded.expiration
    WHERE entries.expiration IS NOT NULL AND entries.expiration <= $7
"#;

const SELECT_LIVE_DOCUMENT: &str = r#"
    SELECT key, text, public, name, title, expiration
    FROM entries
    WHERE key = $1
    AND (expiration IS NULL OR expiration > $2)
    LIMIT 1
"#;

const SELECT_LIVE_PUBLIC: &str = r#"
    SELECT key, text, public, name, title, expiration, COUNT(*) OVER() AS total
    FROM entries
    WHERE public
    AND (expiration IS NULL OR expiration > $1)
    ORDER BY key
    LIMIT $2 OFFSET $3
"#;

const DELETE_EXPIRED: &str =
    "DELETE FROM entries WHERE expiration IS NOT NULL AND expiration <= $1";

/// Store tunables
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub retention: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
        }
    }
}

#[derive(FromRow)]
struct TotalRow {
    total: i64,
}

/// Keyed document store over a connection manager.
///
/// Cloning is cheap and shares the underlying pool.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    manager: ConnectionManager,
    retention: Duration,
}

impl DocumentStore {
    pub fn new(manager: ConnectionManager, settings: StoreSettings) -> Self {
        Self {
            manager,
            retention: settings.retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// The expiration `put` would store for `options` at time `now`.
    pub fn resolve_expiration(&self, options: PutOptions, now: i64) -> Option<i64> {
        options
            .expiration
            .unwrap_or(Expiry::After(self.retention))
            .resolve(now)
    }

    /// Store a new document under `key`.
    ///
    /// Expiration is `options.expiration` when given, otherwise now plus the
    /// retention window. Fails with [`StoreError::DuplicateKey`] while another
    /// live document holds the key; the stored document is left untouched.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn put(
        &self,
        key: &str,
        document: &NewDocument,
        options: PutOptions,
    ) -> Result<(), StoreError> {
        let key = DocumentKey::new(key)?;
        document.validate()?;

        let now = now_unix();
        let expiration = self.resolve_expiration(options, now);

        let statement = Statement::command(INSERT_DOCUMENT)
            .bind(key.as_str())
            .bind(document.text.as_str())
            .bind(document.public)
            .bind(document.name.as_str())
            .bind(document.title.as_str())
            .bind(expiration)
            .bind(now);

        let affected = match self.manager.execute(statement).await {
            Ok(outcome) => outcome.rows_affected(),
            Err(DbError::Query(e)) if e.is_unique_violation() => 0,
            Err(e) => return Err(StoreError::backend(Operation::Put, Some(key.as_str()), e)),
        };

        if affected == 0 {
            tracing::debug!("key held by a live document");
            return Err(StoreError::DuplicateKey {
                key: key.into_string(),
            });
        }

        tracing::debug!(?expiration, "document stored");
        Ok(())
    }

    /// Fetch the live document stored under `key`.
    ///
    /// Absent and expired keys are both `Ok(None)`.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn get(&self, key: &str) -> Result<Option<Document>, StoreError> {
        let statement = Statement::fetch(SELECT_LIVE_DOCUMENT)
            .bind(key)
            .bind(now_unix());

        let rows = self
            .manager
            .execute(statement)
            .await
            .map_err(|e| StoreError::backend(Operation::Get, Some(key), e))?
            .into_rows();

        let document = rows
            .first()
            .map(|row| row.decode::<Document>())
            .transpose()
            .map_err(|e| StoreError::backend(Operation::Get, Some(key), e))?;

        tracing::debug!(found = document.is_some(), "lookup complete");
        Ok(document)
    }

    /// Live public documents, ordered by key.
    ///
    /// `total` counts matches across all pages; a page past the end reports 0.
    pub async fn list_public(&self, page: Pagination) -> Result<Paginated<Document>, StoreError> {
        let statement = Statement::fetch(SELECT_LIVE_PUBLIC)
            .bind(now_unix())
            .bind(page.limit())
            .bind(page.offset());

        let rows = self
            .manager
            .execute(statement)
            .await
            .map_err(|e| StoreError::backend(Operation::ListPublic, None, e))?
            .into_rows();

        let decode_err = |e: QueryError| StoreError::backend(Operation::ListPublic, None, e);
        let total = match rows.first() {
            Some(row) => row.decode::<TotalRow>().map_err(decode_err)?.total,
            None => 0,
        };
        let items = rows
            .iter()
            .map(|row| row.decode::<Document>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(decode_err)?;

        Ok(Paginated {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    /// Delete rows that are already unreachable, returning how many went.
    pub async fn sweep_expired(&self) -> Result<u64, StoreError> {
        let removed = self
            .manager
            .execute(Statement::command(DELETE_EXPIRED).bind(now_unix()))
            .await
            .map_err(|e| StoreError::backend(Operation::Sweep, None, e))?
            .rows_affected();

        tracing::debug!(removed, "expired documents swept");
        Ok(removed)
    }
}

/// The store's clock, in Unix seconds.
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}
