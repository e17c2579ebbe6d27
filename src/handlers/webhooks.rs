use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;

use crate::middleware::auth::AdminUser;
use crate::models::webhook::{ListWebhooksQuery, WebhookLog, WebhookLogPage, WebhookLogRow, WebhookSummary};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

const LIST_COLUMNS: &str = "id, order_id, webhook_type, processed, error_message, \
                            tickets_created, created_at, processed_at";

/// Paged listing without the raw payloads; those are only served from
/// the by-id endpoint to keep list responses small.
pub async fn list_webhooks(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Query(query): Query<ListWebhooksQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let (logs, total) = match query.processed {
        Some(processed) => {
            let logs = sqlx::query_as::<_, WebhookLogRow>(&format!(
                "SELECT {} FROM webhook_logs WHERE processed = $1 \
                 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                LIST_COLUMNS
            ))
            .bind(processed)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?;

            let (total,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM webhook_logs WHERE processed = $1")
                    .bind(processed)
                    .fetch_one(&state.pool)
                    .await?;

            (logs, total)
        }
        None => {
            let logs = sqlx::query_as::<_, WebhookLogRow>(&format!(
                "SELECT {} FROM webhook_logs ORDER BY created_at DESC LIMIT $1 OFFSET $2",
                LIST_COLUMNS
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?;

            let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM webhook_logs")
                .fetch_one(&state.pool)
                .await?;

            (logs, total)
        }
    };

    Ok(success(
        WebhookLogPage {
            logs,
            total,
            limit,
            offset,
        },
        "Webhook logs retrieved successfully",
    ))
}

pub async fn get_webhook(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let log = sqlx::query_as::<_, WebhookLog>("SELECT * FROM webhook_logs WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Webhook log not found".to_string()))?;

    Ok(success(log, "Webhook log retrieved successfully"))
}

pub async fn webhook_summary(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> Result<impl IntoResponse, AppError> {
    let summary = sqlx::query_as::<_, WebhookSummary>(
        "SELECT COUNT(*) AS total_webhooks, \
                COUNT(*) FILTER (WHERE processed) AS processed_webhooks, \
                COUNT(*) FILTER (WHERE NOT processed) AS unprocessed_webhooks, \
                COUNT(*) FILTER (WHERE error_message IS NOT NULL) AS webhooks_with_errors, \
                COALESCE(SUM(tickets_created), 0)::BIGINT AS total_tickets_created \
         FROM webhook_logs",
    )
    .fetch_one(&state.pool)
    .await?;

    Ok(success(summary, "Webhook summary retrieved successfully"))
}
