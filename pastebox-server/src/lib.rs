//! pastebox-server: keyed document store with expiration
//!
//! A [`DocumentStore`] keeps pastes in PostgreSQL (or SQLite) through a
//! [`ConnectionManager`] that bounds pool acquisition and statement time.
//! The `http` module exposes the store over axum.

pub mod config;
pub mod db;
pub mod http;
pub mod models;
pub mod store;
pub mod sweeper;

pub use config::{ConfigError, PasteboxConfig};
pub use db::{ConnectionManager, DbError, ManagerSettings};
pub use http::{run_server, ServerConfig};
pub use models::{Document, Expiry, NewDocument, PutOptions};
pub use store::{DocumentStore, StoreError, StoreSettings};
