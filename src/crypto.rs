//! Password Hashing and Session Tokens
use hmac::Hmac;
use sha2::{Digest, Sha256};

pub(crate) const ITERATION_COUNT: usize = 10_000;

/// Hash a password
///
/// PBKDF2-HMAC-SHA256, salted with the username and the account creation time.  The same three
/// inputs always give the same 32 bytes, which is how a login is checked.
pub(crate) fn hash_password(username: &str, password: &str, created_time: u64) -> [u8; 32] {
    let mut salt = Vec::with_capacity(username.len() + 8);
    salt.extend_from_slice(username.as_bytes());
    salt.extend_from_slice(&created_time.to_le_bytes());

    let mut key = [0; 32];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(password.as_bytes(), &salt, ITERATION_COUNT, &mut key);
    key
}

/// Make a session token
///
/// 32 lowercase hex digits taken from a SHA-256 over the login time, the user's slot, and a
/// per-instance counter.
pub(crate) fn make_session_token(login_nanos: u64, slot: usize, counter: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.input(&login_nanos.to_le_bytes());
    hasher.input(&(slot as u64).to_le_bytes());
    hasher.input(&counter.to_le_bytes());
    let digest = hasher.result();

    digest[..16].iter().map(|b| format!("{:02x}", b)).collect()
}

/// SHA-256 of `bytes`
pub(crate) fn digest(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0; 32];
    out.copy_from_slice(&Sha256::digest(bytes));
    out
}
