use std::collections::HashMap;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use constant_time_eq::constant_time_eq;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::middleware::auth::SuperAdminUser;
use crate::models::migration::{
    MigrationPayload, MigrationReceiveReport, MigrationScan, MigrationSendRequest, MigrationTicket,
};
use crate::models::scan::TicketScan;
use crate::models::settings::Settings;
use crate::models::ticket::{SupplyItem, Ticket, TicketCategory, TicketStatus, TicketSupply};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

const SEND_TIMEOUT: Duration = Duration::from_secs(60);

/// Import endpoint for instance hand-over. No session auth here, the
/// target instance may have no accounts yet. It only opens when the
/// operator has enabled receive mode and set a shared secret, and
/// every request must present that secret.
pub async fn receive_migration(
    State(state): State<AppState>,
    Json(payload): Json<MigrationPayload>,
) -> Result<impl IntoResponse, AppError> {
    if payload.secret.is_empty() {
        return Err(AppError::ValidationError(
            "Secret key is required".to_string(),
        ));
    }

    let settings = Settings::load(&state.pool).await?;
    let Some(settings) = settings.filter(|s| s.receive_mode_enabled) else {
        return Err(AppError::Forbidden(
            "Receive mode is not enabled".to_string(),
        ));
    };
    let Some(secret) = settings
        .receive_mode_secret
        .as_deref()
        .filter(|s| !s.is_empty())
    else {
        return Err(AppError::Forbidden(
            "Receive mode is not enabled".to_string(),
        ));
    };
    if !constant_time_eq(payload.secret.as_bytes(), secret.as_bytes()) {
        return Err(AppError::Forbidden("Invalid secret key".to_string()));
    }

    validate_tickets(&payload.tickets)?;

    let mut report = MigrationReceiveReport {
        inserted: 0,
        updated: 0,
        scans_imported: 0,
    };

    let mut tx = state.pool.begin().await?;

    for ticket in &payload.tickets {
        let existing = sqlx::query("SELECT id FROM tickets WHERE uuid = $1")
            .bind(ticket.uuid)
            .fetch_optional(&mut *tx)
            .await?;

        let (ticket_id,): (i32,) = sqlx::query_as(
            "INSERT INTO tickets (uuid, category, subtype, name, teacher_name, email, \
                                  status, is_used, used_at, order_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (uuid) DO UPDATE SET \
                category = EXCLUDED.category, \
                subtype = EXCLUDED.subtype, \
                name = EXCLUDED.name, \
                teacher_name = EXCLUDED.teacher_name, \
                email = EXCLUDED.email, \
                status = EXCLUDED.status, \
                is_used = EXCLUDED.is_used, \
                used_at = EXCLUDED.used_at, \
                order_id = EXCLUDED.order_id \
             RETURNING id",
        )
        .bind(ticket.uuid)
        .bind(&ticket.category)
        .bind(&ticket.subtype)
        .bind(&ticket.name)
        .bind(&ticket.teacher_name)
        .bind(&ticket.email)
        .bind(&ticket.status)
        .bind(ticket.is_used)
        .bind(ticket.used_at)
        .bind(&ticket.order_id)
        .bind(ticket.created_at)
        .fetch_one(&mut *tx)
        .await?;

        if existing.is_some() {
            report.updated += 1;
        } else {
            report.inserted += 1;
        }

        // One scan per ticket at the storage level; the earliest one
        // wins, scanner attribution does not cross instances.
        if let Some(scan) = ticket.scans.iter().min_by_key(|s| s.scanned_at) {
            let result = sqlx::query(
                "INSERT INTO ticket_scans (ticket_id, scanned_at, scan_date) \
                 VALUES ($1, $2, $3) ON CONFLICT (ticket_id) DO NOTHING",
            )
            .bind(ticket_id)
            .bind(scan.scanned_at)
            .bind(scan.scan_date)
            .execute(&mut *tx)
            .await?;
            report.scans_imported += result.rows_affected() as usize;
        }

        if !ticket.supplies.is_empty() {
            sqlx::query("DELETE FROM ticket_supplies WHERE ticket_id = $1")
                .bind(ticket_id)
                .execute(&mut *tx)
                .await?;
            for supply in &ticket.supplies {
                sqlx::query(
                    "INSERT INTO ticket_supplies (ticket_id, supply_name, quantity) \
                     VALUES ($1, $2, $3)",
                )
                .bind(ticket_id)
                .bind(&supply.name)
                .bind(supply.quantity)
                .execute(&mut *tx)
                .await?;
            }
        }
    }

    tx.commit().await?;

    info!(
        inserted = report.inserted,
        updated = report.updated,
        scans = report.scans_imported,
        "Migration received"
    );

    Ok(success(report, "Migration received successfully"))
}

#[derive(Serialize)]
struct SendSummary {
    tickets: usize,
    scans: usize,
    supplies: usize,
}

#[derive(Serialize)]
struct SendResponse {
    sent: SendSummary,
    target_response: Value,
}

/// Export everything ticket-related to a peer instance's receive
/// endpoint. The peer must have receive mode enabled with the same
/// secret.
pub async fn send_migration(
    State(state): State<AppState>,
    SuperAdminUser(user): SuperAdminUser,
    Json(payload): Json<MigrationSendRequest>,
) -> Result<impl IntoResponse, AppError> {
    let target_url = payload.target_url.trim().trim_end_matches('/').to_string();
    if target_url.is_empty() || payload.secret.is_empty() {
        return Err(AppError::ValidationError(
            "Target URL and secret key are required".to_string(),
        ));
    }

    let tickets = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets ORDER BY id")
        .fetch_all(&state.pool)
        .await?;
    let scans = sqlx::query_as::<_, TicketScan>("SELECT * FROM ticket_scans ORDER BY id")
        .fetch_all(&state.pool)
        .await?;
    let supplies = sqlx::query_as::<_, TicketSupply>("SELECT * FROM ticket_supplies ORDER BY id")
        .fetch_all(&state.pool)
        .await?;

    let summary = SendSummary {
        tickets: tickets.len(),
        scans: scans.len(),
        supplies: supplies.len(),
    };
    let export = export_tickets(tickets, scans, supplies);

    info!(
        target = %target_url,
        tickets = summary.tickets,
        by = %user.username,
        "Sending migration"
    );

    let endpoint = format!("{}/api/migration/receive", target_url);
    let response = reqwest::Client::new()
        .post(&endpoint)
        .timeout(SEND_TIMEOUT)
        .json(&MigrationPayload {
            secret: payload.secret,
            tickets: export,
        })
        .send()
        .await
        .map_err(|e| {
            AppError::ExternalServiceError(format!("Failed to connect to target instance: {}", e))
        })?;

    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    if !status.is_success() {
        return Err(AppError::ExternalServiceError(format!(
            "Target instance rejected migration ({}): {}",
            status, text
        )));
    }

    let target_response =
        serde_json::from_str::<Value>(&text).unwrap_or_else(|_| Value::String(text));

    Ok(success(
        SendResponse {
            sent: summary,
            target_response,
        },
        "Migration sent successfully",
    ))
}

fn validate_tickets(tickets: &[MigrationTicket]) -> Result<(), AppError> {
    for ticket in tickets {
        if ticket.category.parse::<TicketCategory>().is_err() {
            return Err(AppError::ValidationError(format!(
                "Ticket {}: unknown category '{}'",
                ticket.uuid, ticket.category
            )));
        }
        if ticket.status.parse::<TicketStatus>().is_err() {
            return Err(AppError::ValidationError(format!(
                "Ticket {}: unknown status '{}'",
                ticket.uuid, ticket.status
            )));
        }
    }
    Ok(())
}

/// Reassemble flat ticket/scan/supply rows into the nested wire shape.
fn export_tickets(
    tickets: Vec<Ticket>,
    scans: Vec<TicketScan>,
    supplies: Vec<TicketSupply>,
) -> Vec<MigrationTicket> {
    let mut scans_by_ticket: HashMap<i32, Vec<MigrationScan>> = HashMap::new();
    for scan in scans {
        scans_by_ticket
            .entry(scan.ticket_id)
            .or_default()
            .push(MigrationScan {
                scanned_at: scan.scanned_at,
                scan_date: scan.scan_date,
            });
    }

    let mut supplies_by_ticket: HashMap<i32, Vec<SupplyItem>> = HashMap::new();
    for supply in supplies {
        supplies_by_ticket
            .entry(supply.ticket_id)
            .or_default()
            .push(SupplyItem {
                name: supply.supply_name,
                quantity: supply.quantity,
            });
    }

    tickets
        .into_iter()
        .map(|ticket| MigrationTicket {
            uuid: ticket.uuid,
            category: ticket.category.as_str().to_string(),
            subtype: ticket.subtype,
            name: ticket.name,
            teacher_name: ticket.teacher_name,
            email: ticket.email,
            status: ticket.status.as_str().to_string(),
            is_used: ticket.is_used,
            used_at: ticket.used_at,
            order_id: ticket.order_id,
            created_at: ticket.created_at,
            scans: scans_by_ticket.remove(&ticket.id).unwrap_or_default(),
            supplies: supplies_by_ticket.remove(&ticket.id).unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    fn migration_ticket(category: &str, status: &str) -> MigrationTicket {
        MigrationTicket {
            uuid: Uuid::new_v4(),
            category: category.to_string(),
            subtype: None,
            name: "Robin Doe".to_string(),
            teacher_name: None,
            email: "robin@example.com".to_string(),
            status: status.to_string(),
            is_used: false,
            used_at: None,
            order_id: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            scans: Vec::new(),
            supplies: Vec::new(),
        }
    }

    #[test]
    fn rejects_unknown_categories_and_statuses() {
        assert!(validate_tickets(&[migration_ticket("attendee", "valid")]).is_ok());
        assert!(validate_tickets(&[migration_ticket("sponsor", "valid")]).is_err());
        assert!(validate_tickets(&[migration_ticket("student", "suspended")]).is_err());
    }

    #[test]
    fn export_nests_scans_and_supplies_under_their_ticket() {
        let ticket = Ticket {
            id: 3,
            uuid: Uuid::new_v4(),
            category: crate::models::ticket::TicketCategory::Exhibitor,
            subtype: None,
            name: "Booth Co".to_string(),
            teacher_name: None,
            email: "booth@example.com".to_string(),
            status: crate::models::ticket::TicketStatus::Valid,
            is_used: true,
            used_at: None,
            order_id: Some("1001".to_string()),
            email_sent: false,
            email_sent_at: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        };
        let scan = TicketScan {
            id: 1,
            ticket_id: 3,
            scanned_at: Utc.with_ymd_and_hms(2025, 6, 14, 15, 0, 0).unwrap(),
            scan_date: NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(),
            scanned_by_user_id: Some(2),
        };
        let supply = TicketSupply {
            id: 1,
            ticket_id: 3,
            supply_name: "Chairs".to_string(),
            quantity: 4,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        };

        let exported = export_tickets(vec![ticket], vec![scan], vec![supply]);
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].category, "exhibitor");
        assert_eq!(exported[0].scans.len(), 1);
        assert_eq!(exported[0].supplies[0].name, "Chairs");
        assert_eq!(exported[0].supplies[0].quantity, 4);
    }
}
