use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::models::settings::Settings;
use crate::state::AppState;
use crate::utils::error::AppError;

/// Rejects mutating traffic (issuance, orders, scans) with 423 while
/// the lockdown switch is on.
///
/// Fails OPEN: if the flag cannot be read the request goes through.
/// Lockdown is an operator convenience, and a storage hiccup must not
/// turn it into a denial of service at the front door. The trade-off
/// is called out in the deployment docs.
pub async fn lockdown_gate(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match Settings::load(&state.pool).await {
        Ok(Some(settings)) if settings.lockdown_mode => Err(AppError::Locked(
            "The system is currently in lockdown mode. All ticket creation and scanning operations are temporarily disabled.".to_string(),
        )),
        Ok(_) => Ok(next.run(request).await),
        Err(e) => {
            warn!(error = ?e, "Could not read lockdown flag, letting request through");
            Ok(next.run(request).await)
        }
    }
}
