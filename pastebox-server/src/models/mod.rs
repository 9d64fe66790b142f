//! Domain models with validation at construction
//!
//! Invalid input returns `ValidationError`, never a panic.

pub mod document;
pub mod key;
pub mod pagination;
pub mod validation;

pub use document::{Document, Expiry, NewDocument, PutOptions};
pub use key::DocumentKey;
pub use pagination::{Paginated, Pagination, PaginationParams};
pub use validation::ValidationError;
