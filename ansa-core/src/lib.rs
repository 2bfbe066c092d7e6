//! # Ansa Core
//!
//! Multi-tenant membership ledger for the Ansa platform: users, workspaces,
//! and the role-bearing membership edges between them. This crate owns the
//! transactional write paths and the authorization read views; the HTTP
//! surface lives in `ansa-api`.
//!
//! ## Module Organization
//!
//! - `models`: Database models and data structures
//! - `ledger`: Transactional membership operations and their invariants
//! - `bootstrap`: One-time first-user registration
//! - `provision`: External (OAuth) identity provisioning
//! - `view`: Requester-scoped read queries
//! - `auth`: Password hashing, recovery codes, login
//! - `db`: Pool construction and migrations
//! - `error`: Common error types

pub mod auth;
pub mod bootstrap;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod provision;
pub mod view;

/// Current version of the ansa core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
