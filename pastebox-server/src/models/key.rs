//! Document key validation
//!
//! Keys are opaque and supplied by the caller; the only rules are the ones
//! that keep them addressable in a URL path segment.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use super::ValidationError;

/// Maximum length for document keys
pub const MAX_KEY_LEN: usize = 256;

/// No whitespace, no path separators, no `?`/`#`
static KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s/?#]+$").expect("invalid key regex"));

/// Validated document key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey(String);

impl DocumentKey {
    /// Create a new key.
    ///
    /// # Rules
    /// - 1 to 256 characters
    /// - No whitespace, `/`, `?` or `#`
    ///
    /// # Example
    /// ```
    /// use pastebox_server::models::DocumentKey;
    ///
    /// assert!(DocumentKey::new("abc123").is_ok());
    /// assert!(DocumentKey::new("a/b").is_err());
    /// ```
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "key" });
        }

        super::validation::check_len("key", s, MAX_KEY_LEN)?;

        if !KEY_RE.is_match(s) {
            return Err(ValidationError::InvalidFormat {
                field: "key",
                reason: "must not contain whitespace, '/', '?' or '#'",
            });
        }

        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for DocumentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
