use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::models::user::{Role, User};
use crate::services::sessions;
use crate::state::AppState;
use crate::utils::error::AppError;

/// Raw token from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::AuthError("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| {
                AppError::AuthError("Invalid authorization format, expected 'Bearer <token>'".to_string())
            })?
            .trim();

        if token.is_empty() {
            return Err(AppError::AuthError("Empty bearer token".to_string()));
        }

        Ok(Self(token.to_string()))
    }
}

/// Any signed-in staff account: verifier, admin or superadmin.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;

        let user = sessions::user_for_token(&state.pool, &token)
            .await?
            .ok_or_else(|| AppError::AuthError("Invalid or expired session".to_string()))?;

        Ok(Self(user))
    }
}

/// Admin or superadmin account.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;

        if !user.role.is_admin() {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }

        Ok(Self(user))
    }
}

/// Superadmin only.
#[derive(Debug, Clone)]
pub struct SuperAdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for SuperAdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;

        if user.role != Role::Superadmin {
            return Err(AppError::Forbidden(
                "Access denied. SuperAdmin privileges required.".to_string(),
            ));
        }

        Ok(Self(user))
    }
}
