//! Database layer - connection pool, connection manager and schema
//!
//! # Design Principles
//!
//! - One pool per process, owned by the `ConnectionManager`
//! - Every lease is released on every exit path (guard, not bookkeeping)
//! - Acquisition and statements are both time-bounded
//! - Rely on DB constraints, handle conflicts - no check-then-insert

pub mod connection;
pub mod error;
pub mod migrations;
pub mod pool;

pub use connection::{
    ConnectionManager, LeasedConnection, ManagerSettings, Outcome, Param, Row, Statement,
    StatementKind,
};
pub use error::{ConnectionError, DbError, QueryError};
pub use pool::{create_pool, create_pool_with_options, BackendKind, BackendPool, PoolSettings};
