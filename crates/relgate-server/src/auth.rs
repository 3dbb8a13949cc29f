use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;

const KEY_PREFIX: &str = "relgate";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingHeader,

    #[error("invalid admin key format")]
    InvalidKeyFormat,

    #[error("invalid admin key")]
    InvalidKey,

    #[error("internal authentication error: {0}")]
    Internal(String),
}

/// Splits `relgate_<key_id>_<secret>` into its id and secret parts.
pub fn parse_admin_key(raw_key: &str) -> Result<(&str, &str), AuthError> {
    let parts: Vec<&str> = raw_key.splitn(3, '_').collect();
    if parts.len() != 3 || parts[0] != KEY_PREFIX {
        return Err(AuthError::InvalidKeyFormat);
    }
    let key_id = parts[1];
    let secret = parts[2];
    if key_id.is_empty() || secret.is_empty() {
        return Err(AuthError::InvalidKeyFormat);
    }
    Ok((key_id, secret))
}

pub fn hash_secret(secret: &str) -> Result<String, AuthError> {
    let salt = argon2::password_hash::SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    Ok(hash.to_string())
}

pub fn verify_secret(secret: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| AuthError::Internal(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed_hash)
        .is_ok())
}

fn random_token(len: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..36);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect()
}

/// Returns `(full_key, secret)`. Only the hash of `secret` is configured on
/// the server.
pub fn generate_admin_key() -> (String, String) {
    let key_id = random_token(8);
    let secret = random_token(32);
    (format!("{KEY_PREFIX}_{key_id}_{secret}"), secret)
}

/// Checks a presented admin key against the configured argon2 hash.
pub fn authenticate(raw_key: &str, key_hash: &str) -> Result<(), AuthError> {
    let (_, secret) = parse_admin_key(raw_key)?;
    if verify_secret(secret, key_hash)? {
        Ok(())
    } else {
        Err(AuthError::InvalidKey)
    }
}
