/// Recovery code generation and verification
///
/// Recovery codes are single-use credentials issued exactly once at user
/// creation and shown only to their owner. The plaintext codes are returned
/// to the caller; only SHA-256 digests are stored on the user row, and a
/// code is removed from the stored set when consumed by a password reset.
use rand::Rng;
use sha2::{Digest, Sha256};

/// Number of recovery codes issued per user
pub const RECOVERY_CODE_COUNT: usize = 5;

/// Grouped length of a recovery code, e.g. `k3pt-9wqa-vmx2`
const GROUPS: usize = 3;
const GROUP_LEN: usize = 4;

const ALPHABET: &[u8] = b"abcdefghjkmnpqrstuvwxyz23456789";

/// Generates a fresh set of plaintext recovery codes
pub fn generate_codes() -> Vec<String> {
    (0..RECOVERY_CODE_COUNT).map(|_| generate_code()).collect()
}

/// Generates a single recovery code
///
/// The alphabet excludes ambiguous characters (0/o, 1/l/i) since codes are
/// read back by humans.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();

    (0..GROUPS)
        .map(|_| {
            (0..GROUP_LEN)
                .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// SHA-256 digest of a code, hex-encoded, for storage and lookup
pub fn digest(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Digests for a whole set of codes
pub fn digest_all(codes: &[String]) -> Vec<String> {
    codes.iter().map(|c| digest(c)).collect()
}

/// Finds the stored digest matched by a presented code, if any
///
/// Comparison is constant-time per digest so the lookup does not leak which
/// stored code (if any) was close.
pub fn match_digest<'a>(code: &str, stored_digests: &'a [String]) -> Option<&'a str> {
    let presented = digest(code);

    stored_digests
        .iter()
        .find(|stored| constant_time_eq(presented.as_bytes(), stored.as_bytes()))
        .map(|s| s.as_str())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
