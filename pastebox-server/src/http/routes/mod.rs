//! Route handlers organized by resource

pub mod documents;
pub mod health;
