use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::middleware::auth::AuthUser;
use crate::models::ticket::{SupplyItem, Ticket, TicketCategory};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{error, success};
use crate::verification::{self, Denial, Verdict};

#[derive(Serialize)]
struct VerifyOutcome {
    status: &'static str,
    category: TicketCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtype_label: Option<String>,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    teacher_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    day: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    supplies: Vec<SupplyItem>,
}

/// One door scan. Every scanner account can call this; the acting
/// user is recorded on the scan row for the audit trail.
pub async fn verify_scan(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(uuid): Path<String>,
) -> Result<Response, AppError> {
    let verdict = verification::verify_ticket(&state.pool, &uuid, user.id, Utc::now()).await?;

    match verdict {
        Verdict::Admitted {
            ticket,
            day,
            supplies,
        } => {
            let subtype_label = ticket.subtype_label();
            let outcome = VerifyOutcome {
                status: "valid",
                category: ticket.category,
                subtype: ticket.subtype,
                subtype_label,
                name: ticket.name,
                teacher_name: ticket.teacher_name,
                day: day.map(|d| d.name()),
                supplies,
            };
            Ok(success(outcome, "Access granted to the convention").into_response())
        }
        Verdict::Denied { ticket, denial } => Ok(denial_response(ticket, denial)),
    }
}

fn denial_response(ticket: Option<Ticket>, denial: Denial) -> Response {
    let mut details = Map::new();

    if let Some(ticket) = &ticket {
        details.insert("name".to_string(), json!(ticket.name));
        details.insert("category".to_string(), json!(ticket.category));
        if let Some(subtype) = &ticket.subtype {
            details.insert("subtype".to_string(), json!(subtype));
        }
    }

    match &denial {
        Denial::InvalidStatus { status } => {
            details.insert("status".to_string(), json!(status));
        }
        Denial::WrongDate { allowed_days } => {
            let days: Vec<&str> = allowed_days.iter().map(|d| d.name()).collect();
            details.insert("allowed_days".to_string(), json!(days));
        }
        Denial::AlreadyScanned { scanned_on } => {
            details.insert("scanned_on".to_string(), json!(scanned_on.to_string()));
        }
        _ => {}
    }

    let details = if details.is_empty() {
        None
    } else {
        Some(Value::Object(details))
    };

    error(
        denial.code(),
        denial.message(),
        details,
        denial.http_status(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use chrono::{NaiveDate, TimeZone};
    use uuid::Uuid;

    use crate::models::settings::EventDay;
    use crate::models::ticket::TicketStatus;

    fn sample_ticket() -> Ticket {
        Ticket {
            id: 7,
            uuid: Uuid::new_v4(),
            category: TicketCategory::Attendee,
            subtype: Some("adult_saturday".to_string()),
            name: "Robin Doe".to_string(),
            teacher_name: None,
            email: "robin@example.com".to_string(),
            status: TicketStatus::Valid,
            is_used: false,
            used_at: None,
            order_id: None,
            email_sent: false,
            email_sent_at: None,
            created_at: chrono::Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn denial_payload_carries_holder_and_allowed_days() {
        let denial = Denial::WrongDate {
            allowed_days: vec![EventDay::Saturday],
        };
        let response = denial_response(Some(sample_ticket()), denial);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "WRONG_DATE");
        assert_eq!(body["error"]["details"]["name"], "Robin Doe");
        assert_eq!(body["error"]["details"]["allowed_days"][0], "Saturday");
    }

    #[tokio::test]
    async fn unknown_ticket_denial_has_no_details() {
        let response = denial_response(None, Denial::NotFound);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "TICKET_NOT_FOUND");
        assert!(body["error"]["details"].is_null());
    }

    #[tokio::test]
    async fn already_scanned_denial_reports_the_date() {
        let denial = Denial::AlreadyScanned {
            scanned_on: NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(),
        };
        let response = denial_response(Some(sample_ticket()), denial);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["details"]["scanned_on"], "2025-06-14");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("2025-06-14"));
    }
}
