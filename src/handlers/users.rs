use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use tracing::info;

use crate::middleware::auth::{AuthUser, BearerToken};
use crate::models::user::ChangePasswordRequest;
use crate::services::sessions;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::empty_success;

/// Change the caller's own password. Every other session for the
/// account is revoked; the one making the request stays alive.
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    BearerToken(token): BearerToken,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.new_password.len() < 6 {
        return Err(AppError::ValidationError(
            "New password must be at least 6 characters".to_string(),
        ));
    }

    if !sessions::verify_password(&payload.current_password, &user.password_hash)? {
        return Err(AppError::AuthError(
            "Current password is incorrect".to_string(),
        ));
    }

    let password_hash = sessions::hash_password(&payload.new_password)?;

    sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(&password_hash)
        .bind(user.id)
        .execute(&state.pool)
        .await?;

    sqlx::query("DELETE FROM sessions WHERE user_id = $1 AND token_hash <> $2")
        .bind(user.id)
        .bind(sessions::hash_token(&token))
        .execute(&state.pool)
        .await?;

    info!(username = %user.username, "Password changed");

    Ok(empty_success("Password changed successfully"))
}
