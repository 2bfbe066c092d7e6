/// API route handlers
///
/// - `health`: liveness and database probe
/// - `auth`: bootstrap, login, OAuth provisioning, password reset
/// - `users`: membership management and visibility
/// - `workspaces`: workspace creation, editing, and context switching
pub mod auth;
pub mod health;
pub mod users;
pub mod workspaces;
