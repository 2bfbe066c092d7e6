/// Database models for the membership core
///
/// This module contains the three durable relations the core owns and their
/// row-level operations. All functions take any `PgExecutor` so the ledger
/// can compose them inside a single transaction.
///
/// # Models
///
/// - `user`: identity records with credentials and recovery material
/// - `workspace`: named tenant boundaries with quotas
/// - `membership`: the user-workspace edge carrying role and default flag
pub mod membership;
pub mod user;
pub mod workspace;
