/// Credential utilities for the membership core
///
/// - `password`: Argon2id hashing and verification
/// - `recovery`: single-use recovery code generation and digest matching
/// - `credentials`: login and recovery-code password reset flows
pub mod credentials;
pub mod password;
pub mod recovery;
