use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use constant_time_eq::constant_time_eq;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::handlers::tickets::deliver_ticket_email;
use crate::models::settings::Settings;
use crate::models::ticket::{Ticket, TicketCategory, TicketSubtype};
use crate::models::webhook::{CreatedTicket, OrderRequest, OrderResponse};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Serialize)]
struct OrdersHealthPayload {
    status: &'static str,
    endpoint: &'static str,
}

/// Unauthenticated probe so the storefront can check the integration
/// is up before pointing webhooks at it.
pub async fn orders_health() -> impl IntoResponse {
    let payload = OrdersHealthPayload {
        status: "ok",
        endpoint: "orders",
    };
    success(payload, "Order intake is ready").into_response()
}

/// Storefront order webhook, authenticated by a shared `X-Api-Key`
/// header and idempotent on the external order id. Every request is
/// audited in `webhook_logs` whether or not ticket creation succeeds.
pub async fn order_intake(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<OrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    check_api_key(&state, &headers)?;

    let raw_payload = serde_json::to_value(&payload)
        .map_err(|e| AppError::InternalServerError(format!("Failed to encode payload: {}", e)))?;

    let (log_id,): (i32,) = sqlx::query_as(
        "INSERT INTO webhook_logs (order_id, webhook_type, payload) \
         VALUES ($1, 'order_create', $2) RETURNING id",
    )
    .bind(&payload.order_id)
    .bind(&raw_payload)
    .fetch_one(&state.pool)
    .await?;

    let order = match validate_order(&payload) {
        Ok(order) => order,
        Err(e) => {
            mark_log_failed(&state, log_id, &e.to_string()).await;
            return Err(e);
        }
    };

    // A storefront retry of an already-processed order returns the
    // original tickets and creates nothing.
    if let Some(order_id) = &payload.order_id {
        let existing = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&state.pool)
        .await?;

        if !existing.is_empty() {
            info!(order_id = %order_id, "Order already processed, returning existing tickets");
            finalize_log(&state, log_id, 0, Some("Order already processed")).await?;

            return Ok(success(
                OrderResponse {
                    tickets: existing.iter().map(created_ticket).collect(),
                    failed: Vec::new(),
                    already_processed: true,
                },
                "Order already processed",
            )
            .into_response());
        }
    }

    let auto_send = match Settings::load(&state.pool).await? {
        Some(settings) => settings.auto_send_emails,
        None => true,
    };

    let mut tickets = Vec::new();
    let mut failed = Vec::new();

    for _ in 0..order.quantity {
        let insert = sqlx::query_as::<_, Ticket>(
            "INSERT INTO tickets (uuid, category, subtype, name, email, order_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(TicketCategory::Attendee)
        .bind(order.subtype.key())
        .bind(&order.name)
        .bind(&order.email)
        .bind(&payload.order_id)
        .fetch_one(&state.pool)
        .await;

        let mut ticket = match insert {
            Ok(ticket) => ticket,
            Err(e) => {
                mark_log_failed(
                    &state,
                    log_id,
                    &format!("Database error after {} tickets", tickets.len()),
                )
                .await;
                return Err(e.into());
            }
        };

        if auto_send {
            match deliver_ticket_email(&state, &ticket, &[]).await {
                Ok(Some(updated)) => ticket = updated,
                Ok(None) => {}
                Err(e) => {
                    warn!(ticket_id = ticket.id, error = %e, "Order ticket email failed");
                    failed.push(format!("{}: email failed", ticket.uuid));
                }
            }
        }

        tickets.push(ticket);
    }

    let error_message = if failed.is_empty() {
        None
    } else {
        Some(format!("Email failures: {}", failed.join("; ")))
    };
    finalize_log(&state, log_id, tickets.len() as i32, error_message.as_deref()).await?;

    info!(
        order_id = ?payload.order_id,
        count = tickets.len(),
        "Order processed"
    );

    Ok(created(
        OrderResponse {
            tickets: tickets.iter().map(created_ticket).collect(),
            failed,
            already_processed: false,
        },
        "Order processed successfully",
    )
    .into_response())
}

#[derive(Debug)]
struct ValidOrder {
    name: String,
    email: String,
    subtype: TicketSubtype,
    quantity: i32,
}

fn check_api_key(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = &state.config.order_api_key else {
        warn!("Order webhook called but ORDER_API_KEY is not configured");
        return Err(AppError::AuthError(
            "Order intake is not configured".to_string(),
        ));
    };

    let provided = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        return Err(AppError::AuthError("Invalid API key".to_string()));
    }

    Ok(())
}

fn validate_order(payload: &OrderRequest) -> Result<ValidOrder, AppError> {
    let name = payload.name.trim().to_string();
    let email = payload.email.trim().to_string();

    if name.is_empty() {
        return Err(AppError::ValidationError("Name is required".to_string()));
    }
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::ValidationError(
            "A valid email address is required".to_string(),
        ));
    }

    let subtype = payload
        .subtype
        .parse::<TicketSubtype>()
        .ok()
        .filter(TicketSubtype::is_sellable)
        .ok_or_else(|| {
            let valid: Vec<&str> = TicketSubtype::ALL
                .iter()
                .filter(|s| s.is_sellable())
                .map(|s| s.key())
                .collect();
            AppError::ValidationError(format!(
                "Invalid subtype. Valid options: {}",
                valid.join(", ")
            ))
        })?;

    let quantity = payload.quantity.unwrap_or(1);
    if !(1..=10).contains(&quantity) {
        return Err(AppError::ValidationError(
            "Quantity must be between 1 and 10".to_string(),
        ));
    }

    Ok(ValidOrder {
        name,
        email,
        subtype,
        quantity,
    })
}

fn created_ticket(ticket: &Ticket) -> CreatedTicket {
    CreatedTicket {
        id: ticket.id,
        uuid: ticket.uuid,
        email_sent: ticket.email_sent,
    }
}

async fn finalize_log(
    state: &AppState,
    log_id: i32,
    tickets_created: i32,
    error_message: Option<&str>,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE webhook_logs SET processed = TRUE, tickets_created = $1, \
         error_message = $2, processed_at = NOW() WHERE id = $3",
    )
    .bind(tickets_created)
    .bind(error_message)
    .bind(log_id)
    .execute(&state.pool)
    .await?;
    Ok(())
}

/// Best-effort error annotation on the audit row. The original error
/// is what the caller reports; a logging failure only gets a warn.
async fn mark_log_failed(state: &AppState, log_id: i32, message: &str) {
    let result = sqlx::query(
        "UPDATE webhook_logs SET error_message = $1, processed_at = NOW() WHERE id = $2",
    )
    .bind(message)
    .bind(log_id)
    .execute(&state.pool)
    .await;

    if let Err(e) = result {
        warn!(log_id, error = ?e, "Failed to annotate webhook log");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(subtype: &str, quantity: Option<i32>) -> OrderRequest {
        OrderRequest {
            name: "Robin Doe".to_string(),
            email: "robin@example.com".to_string(),
            subtype: subtype.to_string(),
            quantity,
            order_id: Some("1001".to_string()),
        }
    }

    #[test]
    fn accepts_sellable_subtypes_only() {
        assert!(validate_order(&order("vip", None)).is_ok());
        assert!(validate_order(&order("adult_2day", None)).is_ok());
        assert!(validate_order(&order("cymbal_summit", None)).is_err());
        assert!(validate_order(&order("backstage", None)).is_err());
    }

    #[test]
    fn quantity_defaults_to_one_and_is_bounded() {
        assert_eq!(validate_order(&order("vip", None)).unwrap().quantity, 1);
        assert_eq!(validate_order(&order("vip", Some(10))).unwrap().quantity, 10);
        assert!(validate_order(&order("vip", Some(0))).is_err());
        assert!(validate_order(&order("vip", Some(11))).is_err());
    }

    #[test]
    fn rejects_blank_holder_fields() {
        let mut bad = order("vip", None);
        bad.name = "  ".to_string();
        assert!(validate_order(&bad).is_err());

        let mut bad = order("vip", None);
        bad.email = "not-an-email".to_string();
        assert!(validate_order(&bad).is_err());
    }

    #[test]
    fn invalid_subtype_error_lists_the_sellable_set() {
        let err = validate_order(&order("backstage", None)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("vip"));
        assert!(message.contains("adult_2day"));
        assert!(!message.contains("cymbal_summit"));
    }
}
