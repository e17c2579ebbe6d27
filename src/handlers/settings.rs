use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{info, warn};

use crate::middleware::auth::{AdminUser, AuthUser};
use crate::models::settings::{PublicSettings, Settings, UpdateSettingsRequest};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

/// Settings are readable without auth because the login pages need the
/// convention name and logo. Unauthenticated and verifier callers get
/// the public subset; admins get the full row. The receive-mode secret
/// is write-only and never serialized for anyone.
pub async fn get_settings(
    State(state): State<AppState>,
    user: Option<AuthUser>,
) -> Result<Response, AppError> {
    let settings = load_settings(&state).await?;

    let is_admin = user.map(|AuthUser(u)| u.role.is_admin()).unwrap_or(false);
    if is_admin {
        Ok(success(settings, "Settings retrieved successfully").into_response())
    } else {
        Ok(success(
            PublicSettings::from(&settings),
            "Settings retrieved successfully",
        )
        .into_response())
    }
}

/// Partial update: absent fields keep their value. `logo_url` and
/// `receive_mode_secret` can be cleared by sending an empty string.
pub async fn update_settings(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<UpdateSettingsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let current = load_settings(&state).await?;

    if let Some(tz) = &payload.event_timezone {
        if tz.parse::<chrono_tz::Tz>().is_err() {
            return Err(AppError::ValidationError(format!(
                "Unknown timezone: {}",
                tz
            )));
        }
    }

    if payload.receive_mode_enabled == Some(true) {
        let new_secret = payload
            .receive_mode_secret
            .as_deref()
            .filter(|s| !s.is_empty());
        let current_secret = current.receive_mode_secret.as_deref();
        if new_secret.is_none() && current_secret.is_none() {
            return Err(AppError::ValidationError(
                "Receive mode requires a secret key".to_string(),
            ));
        }
    }

    let updated = sqlx::query_as::<_, Settings>(
        "UPDATE settings SET \
            convention_name = COALESCE($1, convention_name), \
            logo_url = NULLIF(COALESCE($2, logo_url), ''), \
            friday_date = COALESCE($3, friday_date), \
            saturday_date = COALESCE($4, saturday_date), \
            sunday_date = COALESCE($5, sunday_date), \
            event_timezone = COALESCE($6, event_timezone), \
            auto_send_emails = COALESCE($7, auto_send_emails), \
            lockdown_mode = COALESCE($8, lockdown_mode), \
            receive_mode_enabled = COALESCE($9, receive_mode_enabled), \
            receive_mode_secret = NULLIF(COALESCE($10, receive_mode_secret), ''), \
            updated_at = NOW() \
         WHERE id = $11 RETURNING *",
    )
    .bind(&payload.convention_name)
    .bind(&payload.logo_url)
    .bind(payload.friday_date)
    .bind(payload.saturday_date)
    .bind(payload.sunday_date)
    .bind(&payload.event_timezone)
    .bind(payload.auto_send_emails)
    .bind(payload.lockdown_mode)
    .bind(payload.receive_mode_enabled)
    .bind(&payload.receive_mode_secret)
    .bind(current.id)
    .fetch_one(&state.pool)
    .await?;

    if updated.lockdown_mode != current.lockdown_mode {
        warn!(
            enabled = updated.lockdown_mode,
            by = %admin.username,
            "Lockdown mode toggled"
        );
    }
    if updated.receive_mode_enabled != current.receive_mode_enabled {
        warn!(
            enabled = updated.receive_mode_enabled,
            by = %admin.username,
            "Receive mode toggled"
        );
    }
    info!(by = %admin.username, "Settings updated");

    Ok(success(updated, "Settings updated successfully"))
}

async fn load_settings(state: &AppState) -> Result<Settings, AppError> {
    Settings::load(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Settings not configured".to_string()))
}
