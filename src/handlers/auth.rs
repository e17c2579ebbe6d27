use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use tracing::{info, warn};

use crate::models::user::{LoginRequest, LoginResponse, RegisterRequest, Role, User, UserInfo};
use crate::services::sessions;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

/// Account creation, open for initial setup. Production deployments
/// are expected to restrict this route at the proxy.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let username = payload.username.trim().to_string();

    if username.len() < 3 {
        return Err(AppError::ValidationError(
            "Username must be at least 3 characters".to_string(),
        ));
    }
    if payload.password.len() < 6 {
        return Err(AppError::ValidationError(
            "Password must be at least 6 characters".to_string(),
        ));
    }

    let role = payload.role.unwrap_or(Role::Admin);

    // The first superadmin can be created openly; after that the role
    // is off limits to unauthenticated setup.
    if role == Role::Superadmin {
        let (existing,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = 'superadmin'")
                .fetch_one(&state.pool)
                .await?;
        if existing > 0 {
            return Err(AppError::Forbidden(
                "A superadmin account already exists".to_string(),
            ));
        }
    }

    let duplicate = sqlx::query("SELECT id FROM users WHERE username = $1")
        .bind(&username)
        .fetch_optional(&state.pool)
        .await?;
    if duplicate.is_some() {
        return Err(AppError::ValidationError(
            "Username already exists".to_string(),
        ));
    }

    let password_hash = sessions::hash_password(&payload.password)?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (username, password_hash, role) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(&username)
    .bind(&password_hash)
    .bind(role)
    .fetch_one(&state.pool)
    .await?;

    let token = sessions::create_session(&state.pool, user.id).await?;
    info!(username = %user.username, role = %user.role, "Account created");

    Ok(created(
        LoginResponse {
            token,
            user: UserInfo::from(&user),
        },
        "Account created successfully",
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    // Piggyback session cleanup on logins instead of a timer task.
    if let Err(e) = sessions::prune_expired(&state.pool).await {
        warn!(error = ?e, "Failed to prune expired sessions");
    }

    let user = authenticate(&state, &payload, None).await?;
    let token = sessions::create_session(&state.pool, user.id).await?;
    info!(username = %user.username, "Login");

    Ok(success(
        LoginResponse {
            token,
            user: UserInfo::from(&user),
        },
        "Login successful",
    ))
}

/// Login restricted to verifier accounts, used by the door-scanning
/// frontend. A non-verifier account gets the same rejection as a bad
/// password so the route leaks nothing about existing accounts.
pub async fn verifier_login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = authenticate(&state, &payload, Some(Role::Verifier)).await?;
    let token = sessions::create_session(&state.pool, user.id).await?;
    info!(username = %user.username, "Verifier login");

    Ok(success(
        LoginResponse {
            token,
            user: UserInfo::from(&user),
        },
        "Login successful",
    ))
}

async fn authenticate(
    state: &AppState,
    payload: &LoginRequest,
    required_role: Option<Role>,
) -> Result<User, AppError> {
    let username = payload.username.trim();
    if username.is_empty() || payload.password.is_empty() {
        return Err(AppError::ValidationError(
            "Username and password are required".to_string(),
        ));
    }

    let user = match required_role {
        Some(role) => {
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1 AND role = $2")
                .bind(username)
                .bind(role)
                .fetch_optional(&state.pool)
                .await?
        }
        None => sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&state.pool)
            .await?,
    };

    let Some(user) = user else {
        return Err(AppError::AuthError("Invalid credentials".to_string()));
    };

    if !sessions::verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::AuthError("Invalid credentials".to_string()));
    }

    Ok(user)
}
