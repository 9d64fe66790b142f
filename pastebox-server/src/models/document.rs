//! Document records and the options accepted by `put`

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::validation::check_len;
use super::ValidationError;

/// Maximum length for titles and display names
pub const MAX_LABEL_LEN: usize = 256;

/// A stored paste, as read back from the entries table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub key: String,
    pub text: String,
    pub public: bool,
    pub name: String,
    pub title: String,
    /// Unix seconds; `None` never expires
    pub expiration: Option<i64>,
}

impl Document {
    /// Whether the document is reachable at `now` (Unix seconds).
    pub fn is_live_at(&self, now: i64) -> bool {
        self.expiration.map_or(true, |exp| exp > now)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiration.and_then(|ts| DateTime::from_timestamp(ts, 0))
    }
}

/// Body and metadata of a document about to be stored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub text: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
}

impl NewDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    /// Text must be non-empty; title and name are bounded.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.text.is_empty() {
            return Err(ValidationError::Empty { field: "text" });
        }
        check_len("title", &self.title, MAX_LABEL_LEN)?;
        check_len("name", &self.name, MAX_LABEL_LEN)?;
        Ok(())
    }
}

/// Explicit expiration for a `put`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Stored with a NULL expiration
    Never,
    /// Absolute Unix seconds, past values included
    At(i64),
    /// Relative to the store's clock at insert time
    After(Duration),
}

impl Expiry {
    /// The column value for this expiry, given the store's `now`.
    pub fn resolve(self, now: i64) -> Option<i64> {
        match self {
            Self::Never => None,
            Self::At(ts) => Some(ts),
            Self::After(window) => {
                let secs = i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
                Some(now.saturating_add(secs))
            }
        }
    }
}

/// Options for `DocumentStore::put`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// `None` applies the store's default retention window
    pub expiration: Option<Expiry>,
}

impl PutOptions {
    pub fn expiring(expiry: Expiry) -> Self {
        Self {
            expiration: Some(expiry),
        }
    }
}
