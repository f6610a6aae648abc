//! Argon2id hashing for generated account passwords.
//!
//! Only the PHC string is ever stored; verification goes through the Argon2
//! verifier, whose digest comparison is constant-time.

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};
use std::sync::OnceLock;

#[cfg(not(test))]
fn argon2_params() -> Params {
    Params::default()
}

// Unit tests hash hundreds of passwords; keep them fast.
#[cfg(test)]
fn argon2_params() -> Params {
    Params::new(1024, 1, 1, None).unwrap_or_default()
}

fn argon2_instance() -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params())
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(argon2_instance()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    argon2_instance()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Burn one verification when no account matched, so a miss on the
/// identifier costs about the same as a miss on the password.
pub fn verify_dummy(password: &str) {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    let dummy = DUMMY.get_or_init(|| hash_password("resultsd-dummy-password").ok());
    if let Some(hash) = dummy {
        let _ = verify_password(password, hash);
    }
}
