use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::middleware::auth::AdminUser;
use crate::models::settings::Settings;
use crate::models::ticket::{
    CreateTicketRequest, SupplyItem, Ticket, TicketCategory, TicketSubtype, UpdateStatusRequest,
};
use crate::services::email::TicketEmail;
use crate::services::qr;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};

#[derive(Serialize)]
pub struct TicketWithSupplies {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub supplies: Vec<SupplyItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype_label: Option<String>,
}

#[derive(Serialize)]
pub struct CreateTicketResponse {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub supplies: Vec<SupplyItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype_label: Option<String>,
    /// Inline PNG of the QR code so the admin UI can show it without
    /// another round trip.
    pub qr_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub async fn list_tickets(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> Result<impl IntoResponse, AppError> {
    let tickets = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets ORDER BY created_at DESC")
        .fetch_all(&state.pool)
        .await?;

    let rows = sqlx::query_as::<_, (i32, String, i32)>(
        "SELECT ticket_id, supply_name, quantity FROM ticket_supplies ORDER BY id",
    )
    .fetch_all(&state.pool)
    .await?;

    let mut by_ticket: HashMap<i32, Vec<SupplyItem>> = HashMap::new();
    for (ticket_id, name, quantity) in rows {
        by_ticket
            .entry(ticket_id)
            .or_default()
            .push(SupplyItem { name, quantity });
    }

    let tickets: Vec<TicketWithSupplies> = tickets
        .into_iter()
        .map(|ticket| {
            let supplies = by_ticket.remove(&ticket.id).unwrap_or_default();
            let subtype_label = ticket.subtype_label();
            TicketWithSupplies {
                ticket,
                supplies,
                subtype_label,
            }
        })
        .collect();

    Ok(success(tickets, "Tickets retrieved successfully"))
}

/// Manual issuance from the admin UI. The ticket email is best effort:
/// a delivery failure leaves the ticket in place and comes back as a
/// warning, with an alert to the operations address.
pub async fn create_ticket(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Json(payload): Json<CreateTicketRequest>,
) -> Result<impl IntoResponse, AppError> {
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

    let teacher_name = match payload.category {
        TicketCategory::Student => {
            let teacher = payload
                .teacher_name
                .as_deref()
                .map(str::trim)
                .unwrap_or_default();
            if teacher.is_empty() {
                return Err(AppError::ValidationError(
                    "Teacher name is required for student tickets".to_string(),
                ));
            }
            Some(teacher.to_string())
        }
        _ => None,
    };

    let subtype = match payload.category {
        TicketCategory::Attendee => {
            let raw = payload.subtype.as_deref().unwrap_or_default();
            let parsed: TicketSubtype = raw.parse().map_err(|_| {
                let valid: Vec<&str> = TicketSubtype::ALL.iter().map(|s| s.key()).collect();
                AppError::ValidationError(format!(
                    "Invalid subtype. Valid options: {}",
                    valid.join(", ")
                ))
            })?;
            Some(parsed.key().to_string())
        }
        _ => None,
    };

    let supplies = if payload.category == TicketCategory::Exhibitor {
        for supply in &payload.supplies {
            if supply.name.trim().is_empty() {
                return Err(AppError::ValidationError(
                    "Supply name cannot be empty".to_string(),
                ));
            }
            if supply.quantity < 1 {
                return Err(AppError::ValidationError(
                    "Supply quantity must be at least 1".to_string(),
                ));
            }
        }
        payload.supplies.clone()
    } else {
        Vec::new()
    };

    let mut ticket = sqlx::query_as::<_, Ticket>(
        "INSERT INTO tickets (uuid, category, subtype, name, teacher_name, email) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(payload.category)
    .bind(&subtype)
    .bind(&name)
    .bind(&teacher_name)
    .bind(&email)
    .fetch_one(&state.pool)
    .await?;

    for supply in &supplies {
        sqlx::query("INSERT INTO ticket_supplies (ticket_id, supply_name, quantity) VALUES ($1, $2, $3)")
            .bind(ticket.id)
            .bind(&supply.name)
            .bind(supply.quantity)
            .execute(&state.pool)
            .await?;
    }

    info!(
        ticket_id = ticket.id,
        category = %ticket.category,
        "Ticket created"
    );

    let qr_png = qr::generate_png(&state.config.verify_url(ticket.uuid))?;
    let qr_code = qr::to_data_url(&qr_png);

    let mut warning = None;
    if payload.send_email.unwrap_or(true) {
        match deliver_ticket_email(&state, &ticket, &supplies).await {
            Ok(Some(updated)) => ticket = updated,
            Ok(None) => {
                warning = Some(
                    "Ticket created but the email was not sent (email service not configured)"
                        .to_string(),
                );
            }
            Err(e) => {
                warning = Some("Ticket created but the email failed to send".to_string());
                state
                    .mailer
                    .send_admin_alert(
                        "Ticket email delivery failed",
                        "A ticket was created but its email could not be delivered.",
                        &[
                            ("Recipient", ticket.email.clone()),
                            ("Ticket", ticket.uuid.to_string()),
                            ("Error", e.to_string()),
                        ],
                    )
                    .await;
            }
        }
    }

    let subtype_label = ticket.subtype_label();
    Ok(created(
        CreateTicketResponse {
            ticket,
            supplies,
            subtype_label,
            qr_code,
            warning,
        },
        "Ticket created successfully",
    ))
}

pub async fn resend_email(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let ticket = fetch_ticket(&state, id).await?;
    let supplies = supplies_for(&state, ticket.id).await?;

    match deliver_ticket_email(&state, &ticket, &supplies).await? {
        Some(updated) => Ok(success(updated, "Ticket email sent")),
        None => Err(AppError::ExternalServiceError(
            "Email service is not configured".to_string(),
        )),
    }
}

/// Status writes are monotonic: once a ticket is refunded, cancelled
/// or charged back it can never be flipped back to valid. Moving
/// between invalidated states stays possible so a refund that turns
/// into a chargeback can be recorded.
pub async fn update_status(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ticket = fetch_ticket(&state, id).await?;

    if !ticket.status.can_transition_to(payload.status) {
        return Err(AppError::ValidationError(format!(
            "A {} ticket cannot be restored to valid",
            ticket.status
        )));
    }

    let updated =
        sqlx::query_as::<_, Ticket>("UPDATE tickets SET status = $1 WHERE id = $2 RETURNING *")
            .bind(payload.status)
            .bind(id)
            .fetch_one(&state.pool)
            .await?;

    info!(
        ticket_id = id,
        from = %ticket.status,
        to = %updated.status,
        "Ticket status updated"
    );

    Ok(success(updated, "Ticket status updated successfully"))
}

pub async fn delete_ticket(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM tickets WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Ticket not found".to_string()));
    }

    info!(ticket_id = id, "Ticket deleted");
    Ok(empty_success("Ticket deleted successfully"))
}

/// Admin override for a mis-scan at the door. Removes the scan record
/// and clears the single-use flag so the ticket can be scanned again.
/// This is the only path that ever deletes scan history.
pub async fn clear_scans(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let ticket = fetch_ticket(&state, id).await?;

    sqlx::query("DELETE FROM ticket_scans WHERE ticket_id = $1")
        .bind(ticket.id)
        .execute(&state.pool)
        .await?;

    sqlx::query("UPDATE tickets SET is_used = FALSE, used_at = NULL WHERE id = $1")
        .bind(ticket.id)
        .execute(&state.pool)
        .await?;

    info!(
        ticket_id = ticket.id,
        by = %admin.username,
        "Scan history cleared"
    );

    Ok(empty_success("Ticket scans cleared"))
}

/// Render and send the QR email for a ticket, then record delivery.
/// Returns the updated ticket on success, `None` when mail is not
/// configured. Shared with the order intake path.
pub(crate) async fn deliver_ticket_email(
    state: &AppState,
    ticket: &Ticket,
    supplies: &[SupplyItem],
) -> Result<Option<Ticket>, AppError> {
    let verify_url = state.config.verify_url(ticket.uuid);
    let qr_png = qr::generate_png(&verify_url)?;

    let convention_name = match Settings::load(&state.pool).await? {
        Some(settings) => settings.convention_name,
        None => "My Convention".to_string(),
    };

    let sent = state
        .mailer
        .send_ticket_email(TicketEmail {
            ticket,
            supplies,
            convention_name: &convention_name,
            verify_url: &verify_url,
            qr_png,
        })
        .await?;

    if !sent {
        return Ok(None);
    }

    let updated = sqlx::query_as::<_, Ticket>(
        "UPDATE tickets SET email_sent = TRUE, email_sent_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(ticket.id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Some(updated))
}

async fn fetch_ticket(state: &AppState, id: i32) -> Result<Ticket, AppError> {
    sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))
}

pub(crate) async fn supplies_for(
    state: &AppState,
    ticket_id: i32,
) -> Result<Vec<SupplyItem>, AppError> {
    let rows = sqlx::query_as::<_, (String, i32)>(
        "SELECT supply_name, quantity FROM ticket_supplies WHERE ticket_id = $1 ORDER BY id",
    )
    .bind(ticket_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(name, quantity)| SupplyItem { name, quantity })
        .collect())
}
