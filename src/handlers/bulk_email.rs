use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::middleware::auth::SuperAdminUser;
use crate::models::settings::Settings;
use crate::models::ticket::TicketCategory;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{empty_success, success};

/// Hard daily ceiling across all bulk sends, counted from the send log.
const DAILY_EMAIL_LIMIT: i64 = 100;

/// Gap between consecutive sends, ten per minute.
const SEND_PACING: Duration = Duration::from_secs(6);

#[derive(Deserialize)]
pub struct PreviewRequest {
    pub categories: Vec<TicketCategory>,
}

#[derive(Deserialize)]
pub struct TestRequest {
    pub subject: String,
    pub body: String,
    pub test_email: String,
}

#[derive(Deserialize)]
pub struct SendRequest {
    pub subject: String,
    pub body: String,
    pub categories: Vec<TicketCategory>,
}

#[derive(Serialize)]
pub struct CategoryCount {
    pub category: TicketCategory,
    pub count: i64,
}

#[derive(Serialize)]
pub struct PreviewResponse {
    pub breakdown: Vec<CategoryCount>,
    pub total: i64,
}

#[derive(Serialize)]
pub struct SendError {
    pub email: String,
    pub error: String,
}

#[derive(Serialize)]
pub struct SendReport {
    pub sent: usize,
    pub failed: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<SendError>,
}

/// Recipient counts per selected category, so the composer shows how
/// many emails a send would use before committing to it.
pub async fn preview(
    State(state): State<AppState>,
    SuperAdminUser(_): SuperAdminUser,
    Json(payload): Json<PreviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.categories.is_empty() {
        return Err(AppError::ValidationError(
            "At least one ticket category must be selected".to_string(),
        ));
    }

    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT category, COUNT(DISTINCT email) FROM tickets \
         WHERE category = ANY($1) AND email <> '' AND status = 'valid' \
         GROUP BY category",
    )
    .bind(category_keys(&payload.categories))
    .fetch_all(&state.pool)
    .await?;

    let breakdown: Vec<CategoryCount> = rows
        .into_iter()
        .filter_map(|(category, count)| {
            category
                .parse::<TicketCategory>()
                .ok()
                .map(|category| CategoryCount { category, count })
        })
        .collect();
    let total = breakdown.iter().map(|c| c.count).sum();

    Ok(success(
        PreviewResponse { breakdown, total },
        "Recipient preview retrieved successfully",
    ))
}

pub async fn send_test(
    State(state): State<AppState>,
    SuperAdminUser(user): SuperAdminUser,
    Json(payload): Json<TestRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.subject.trim().is_empty() || payload.body.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Subject and body are required".to_string(),
        ));
    }
    let test_email = payload.test_email.trim();
    if test_email.is_empty() || !test_email.contains('@') {
        return Err(AppError::ValidationError(
            "A valid test email address is required".to_string(),
        ));
    }
    if !state.mailer.is_configured() {
        return Err(AppError::ExternalServiceError(
            "Email service is not configured".to_string(),
        ));
    }

    let html = test_html(&payload.body, &user.username);
    state
        .mailer
        .send_html(test_email, &format!("[TEST] {}", payload.subject), html)
        .await?;

    info!(to = %test_email, by = %user.username, "Test email sent");
    Ok(empty_success(format!("Test email sent to {}", test_email)))
}

/// The actual bulk send, one recipient at a time: send, log it, wait
/// out the pacing gap, next. A failed recipient is recorded and
/// skipped, never fatal. The request stays open for the whole run.
pub async fn send(
    State(state): State<AppState>,
    SuperAdminUser(user): SuperAdminUser,
    Json(payload): Json<SendRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.subject.trim().is_empty() || payload.body.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Subject and body are required".to_string(),
        ));
    }
    if payload.categories.is_empty() {
        return Err(AppError::ValidationError(
            "At least one ticket category must be selected".to_string(),
        ));
    }
    if !state.mailer.is_configured() {
        return Err(AppError::ExternalServiceError(
            "Email service is not configured".to_string(),
        ));
    }

    let recipients = sqlx::query_as::<_, (String, String)>(
        "SELECT DISTINCT email, name FROM tickets \
         WHERE category = ANY($1) AND email <> '' AND status = 'valid' \
         ORDER BY email",
    )
    .bind(category_keys(&payload.categories))
    .fetch_all(&state.pool)
    .await?;

    if recipients.is_empty() {
        return Err(AppError::ValidationError(
            "No valid recipients found for selected ticket categories".to_string(),
        ));
    }

    let (sent_today,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM email_send_log \
         WHERE sent_at >= date_trunc('day', NOW()) AND success = TRUE",
    )
    .fetch_one(&state.pool)
    .await?;

    let remaining = DAILY_EMAIL_LIMIT - sent_today;
    if remaining <= 0 {
        return Err(AppError::RateLimited(format!(
            "Daily email limit of {} emails reached. Please try again tomorrow.",
            DAILY_EMAIL_LIMIT
        )));
    }
    if recipients.len() as i64 > remaining {
        return Err(AppError::RateLimited(format!(
            "Cannot send {} emails. Only {} emails remaining in today's quota of {}.",
            recipients.len(),
            remaining,
            DAILY_EMAIL_LIMIT
        )));
    }

    state
        .bulk_email_cooldown
        .try_acquire(user.id)
        .map_err(|wait| {
            AppError::RateLimited(format!(
                "Please wait {} seconds before sending another bulk email",
                ceil_secs(wait)
            ))
        })?;

    let convention_name = match Settings::load(&state.pool).await? {
        Some(settings) => settings.convention_name,
        None => "the convention".to_string(),
    };

    let total = recipients.len();
    let mut sent = 0;
    let mut errors = Vec::new();

    for (i, (email, name)) in recipients.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(SEND_PACING).await;
        }

        let html = bulk_html(&payload.body, name, &convention_name);
        match state.mailer.send_html(email, &payload.subject, html).await {
            Ok(_) => {
                log_send(&state, email, true).await;
                sent += 1;
            }
            Err(e) => {
                warn!(to = %email, error = %e, "Bulk email send failed");
                log_send(&state, email, false).await;
                errors.push(SendError {
                    email: email.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        by = %user.username,
        sent,
        failed = errors.len(),
        "Bulk email run completed"
    );

    Ok(success(
        SendReport {
            sent,
            failed: errors.len(),
            total,
            errors,
        },
        "Bulk email sending completed",
    ))
}

fn category_keys(categories: &[TicketCategory]) -> Vec<String> {
    categories.iter().map(|c| c.as_str().to_string()).collect()
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

async fn log_send(state: &AppState, email: &str, succeeded: bool) {
    let result = sqlx::query(
        "INSERT INTO email_send_log (recipient_email, send_type, success) \
         VALUES ($1, 'bulk_email', $2)",
    )
    .bind(email)
    .bind(succeeded)
    .execute(&state.pool)
    .await;

    if let Err(e) = result {
        warn!(to = %email, error = ?e, "Failed to record email send");
    }
}

fn test_html(body: &str, sender: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <div style="background: #f44336; color: white; padding: 15px; text-align: center; font-weight: bold; margin-bottom: 20px;">
    TEST EMAIL - This is a preview
  </div>
  {body}
  <div style="margin-top: 30px; padding-top: 20px; border-top: 2px solid #eee; color: #666; font-size: 12px;">
    <p>This is a test email sent from the bulk email tool.</p>
    <p>Sent by: {sender}</p>
  </div>
</div>"#
    )
}

fn bulk_html(body: &str, recipient_name: &str, convention_name: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  {body}
  <div style="margin-top: 30px; padding-top: 20px; border-top: 2px solid #eee; color: #666; font-size: 12px;">
    <p>You are receiving this email because you have a ticket for {convention_name}.</p>
    <p>Ticket holder: {recipient_name}</p>
  </div>
</div>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapper_flags_the_preview_and_sender() {
        let html = test_html("<p>Hello</p>", "casey");
        assert!(html.contains("TEST EMAIL - This is a preview"));
        assert!(html.contains("<p>Hello</p>"));
        assert!(html.contains("Sent by: casey"));
    }

    #[test]
    fn bulk_wrapper_names_holder_and_convention() {
        let html = bulk_html("<p>Doors open at 9.</p>", "Robin", "Winter Fest");
        assert!(html.contains("<p>Doors open at 9.</p>"));
        assert!(html.contains("Ticket holder: Robin"));
        assert!(html.contains("a ticket for Winter Fest"));
    }

    #[test]
    fn ceil_rounds_partial_seconds_up() {
        assert_eq!(ceil_secs(Duration::from_secs(5)), 5);
        assert_eq!(ceil_secs(Duration::from_millis(5400)), 6);
        assert_eq!(ceil_secs(Duration::ZERO), 0);
    }
}
