use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::models::user::User;
use crate::utils::error::AppError;

const SESSION_TTL_HOURS: i64 = 24;

/// Cost 10 keeps verification fast enough for door scanners that log
/// in on the spot.
const BCRYPT_COST: u32 = 10;

/// 256-bit random bearer token, base64url encoded. Only its SHA-256
/// digest is stored, so a leaked sessions table cannot be replayed.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| AppError::InternalServerError(format!("Password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    bcrypt::verify(password, hash)
        .map_err(|e| AppError::InternalServerError(format!("Password check failed: {}", e)))
}

/// Open a session for the user and hand back the one-time-visible
/// token.
pub async fn create_session(pool: &PgPool, user_id: i32) -> Result<String, AppError> {
    let token = generate_token();
    let token_hash = hash_token(&token);
    let expires_at = Utc::now() + Duration::hours(SESSION_TTL_HOURS);

    sqlx::query("INSERT INTO sessions (user_id, token_hash, expires_at) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(&token_hash)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(token)
}

/// Resolve a bearer token to its user, ignoring expired sessions.
pub async fn user_for_token(pool: &PgPool, token: &str) -> Result<Option<User>, AppError> {
    let token_hash = hash_token(token);

    let user = sqlx::query_as::<_, User>(
        "SELECT u.id, u.username, u.password_hash, u.role, u.created_at
         FROM sessions s
         JOIN users u ON u.id = s.user_id
         WHERE s.token_hash = $1 AND s.expires_at > NOW()",
    )
    .bind(&token_hash)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Drop sessions past their expiry. Called opportunistically on login
/// so the table does not grow without bound.
pub async fn prune_expired(pool: &PgPool) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_urlsafe() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn token_hash_is_stable_and_distinct() {
        let token = generate_token();
        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(hash_token(&token), token);
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }
}
