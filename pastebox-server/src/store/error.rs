//! Store-level errors with operation and key context

use std::fmt;

use crate::db::DbError;
use crate::models::ValidationError;

/// The store operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Put,
    Get,
    ListPublic,
    Sweep,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Put => "put",
            Self::Get => "get",
            Self::ListPublic => "list_public",
            Self::Sweep => "sweep",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connection or statement failure underneath the store.
    #[error("{op}{} failed: {source}", .key.as_deref().map(|k| format!(" '{k}'")).unwrap_or_default())]
    Backend {
        op: Operation,
        key: Option<String>,
        #[source]
        source: DbError,
    },

    /// A live document already holds this key.
    #[error("a live document already uses key '{key}'")]
    DuplicateKey { key: String },

    #[error("invalid document: {0}")]
    Invalid(#[from] ValidationError),
}

impl StoreError {
    pub(crate) fn backend(op: Operation, key: Option<&str>, source: impl Into<DbError>) -> Self {
        Self::Backend {
            op,
            key: key.map(str::to_owned),
            source: source.into(),
        }
    }

    /// Whether a retry by the caller could plausibly succeed.
    ///
    /// Duplicates, validation failures and rejected statements are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Backend { source, .. } => source.is_transient(),
            Self::DuplicateKey { .. } | Self::Invalid(_) => false,
        }
    }

    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::Backend { op, .. } => Some(*op),
            Self::DuplicateKey { .. } => Some(Operation::Put),
            Self::Invalid(_) => None,
        }
    }
}
