/// HTTP middleware
///
/// - `security`: response security headers (OWASP set, HSTS in production)
pub mod security;
