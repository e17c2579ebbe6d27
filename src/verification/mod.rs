//! Door check-in. One call per physical scan, one decision per call:
//! either the holder walks in and exactly one row records that, or
//! they are turned away and nothing is written.

pub mod rules;

use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::scan::TicketScan;
use crate::models::settings::{EventDay, Settings};
use crate::models::ticket::{SupplyItem, Ticket, TicketCategory, TicketStatus};
use crate::utils::error::AppError;

#[derive(Debug)]
pub enum Verdict {
    Admitted {
        ticket: Ticket,
        /// Which convention day the admission counted for. Set for
        /// attendees, absent for single-use categories.
        day: Option<EventDay>,
        /// Supply list handed to exhibitors at the door.
        supplies: Vec<SupplyItem>,
    },
    Denied {
        /// The matched ticket, when one exists, so the door display
        /// can still show who the holder is.
        ticket: Option<Ticket>,
        denial: Denial,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    NotFound,
    InvalidStatus { status: TicketStatus },
    ScheduleNotConfigured,
    WrongDate { allowed_days: Vec<EventDay> },
    AlreadyScanned { scanned_on: NaiveDate },
    AlreadyUsed,
}

impl Denial {
    pub fn code(&self) -> &'static str {
        match self {
            Denial::NotFound => "TICKET_NOT_FOUND",
            Denial::InvalidStatus { .. } => "INVALID_STATUS",
            Denial::ScheduleNotConfigured => "SCHEDULE_NOT_CONFIGURED",
            Denial::WrongDate { .. } => "WRONG_DATE",
            Denial::AlreadyScanned { .. } => "ALREADY_SCANNED",
            Denial::AlreadyUsed => "ALREADY_USED",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            Denial::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// What the person at the door is told.
    pub fn message(&self) -> String {
        match self {
            Denial::NotFound => "Ticket not found".to_string(),
            Denial::InvalidStatus { status } => match status {
                TicketStatus::Refunded => {
                    "This ticket has been refunded and is no longer valid".to_string()
                }
                TicketStatus::Chargeback => {
                    "This ticket has been charged back and is no longer valid".to_string()
                }
                TicketStatus::Cancelled => {
                    "This ticket has been cancelled and is no longer valid".to_string()
                }
                _ => "This ticket has been marked as invalid".to_string(),
            },
            Denial::ScheduleNotConfigured => {
                "Convention dates not configured in settings".to_string()
            }
            Denial::WrongDate { allowed_days } => {
                if allowed_days.is_empty() {
                    "This ticket type has no valid admission days".to_string()
                } else {
                    let days: Vec<&str> = allowed_days.iter().map(|d| d.name()).collect();
                    format!("This ticket is only valid on: {}", days.join(", "))
                }
            }
            Denial::AlreadyScanned { scanned_on } => {
                format!("This ticket was already scanned on {}", scanned_on)
            }
            Denial::AlreadyUsed => "This ticket has already been used".to_string(),
        }
    }
}

/// Check a scanned code and, when it admits, record that fact.
///
/// A malformed UUID is treated as an identifier that matches nothing,
/// not as a client error. `now` is taken as a parameter so day
/// boundaries are decided by the caller's clock exactly once.
pub async fn verify_ticket(
    pool: &PgPool,
    uuid_param: &str,
    scanned_by: i32,
    now: DateTime<Utc>,
) -> Result<Verdict, AppError> {
    let Ok(ticket_uuid) = Uuid::parse_str(uuid_param) else {
        return Ok(Verdict::Denied {
            ticket: None,
            denial: Denial::NotFound,
        });
    };

    let Some(ticket) = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE uuid = $1")
        .bind(ticket_uuid)
        .fetch_optional(pool)
        .await?
    else {
        return Ok(Verdict::Denied {
            ticket: None,
            denial: Denial::NotFound,
        });
    };

    if ticket.status != TicketStatus::Valid {
        let denial = Denial::InvalidStatus {
            status: ticket.status,
        };
        return Ok(denied(ticket, denial));
    }

    match ticket.category {
        TicketCategory::Attendee => admit_attendee(pool, ticket, scanned_by, now).await,
        TicketCategory::Student | TicketCategory::Exhibitor => {
            admit_single_use(pool, ticket, now).await
        }
    }
}

/// Day-pass flow: schedule gate, then the single-scan-ever rule.
/// Re-entry on the same day is handled physically at the door, so a
/// second scan of the same code is always a duplicate.
async fn admit_attendee(
    pool: &PgPool,
    ticket: Ticket,
    scanned_by: i32,
    now: DateTime<Utc>,
) -> Result<Verdict, AppError> {
    let allowed = rules::allowed_days(ticket.subtype_kind());

    let Some(schedule) = Settings::load(pool).await?.and_then(|s| s.schedule()) else {
        return Ok(denied(ticket, Denial::ScheduleNotConfigured));
    };

    let today = schedule.local_date(now);
    let Some(day) = rules::admission_day(allowed, &schedule, today) else {
        return Ok(denied(
            ticket,
            Denial::WrongDate {
                allowed_days: allowed.to_vec(),
            },
        ));
    };

    if let Some(scan) = existing_scan(pool, ticket.id).await? {
        return Ok(denied(
            ticket,
            Denial::AlreadyScanned {
                scanned_on: scan.scan_date,
            },
        ));
    }

    // The unique index on ticket_id is the real duplicate gate; two
    // concurrent scans both pass the read above but only one insert
    // lands, and the loser is denied like any other duplicate.
    let inserted = sqlx::query(
        "INSERT INTO ticket_scans (ticket_id, scanned_at, scan_date, scanned_by_user_id)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (ticket_id) DO NOTHING",
    )
    .bind(ticket.id)
    .bind(now)
    .bind(today)
    .bind(scanned_by)
    .execute(pool)
    .await?
    .rows_affected();

    if inserted == 0 {
        let scanned_on = existing_scan(pool, ticket.id)
            .await?
            .map(|scan| scan.scan_date)
            .unwrap_or(today);
        return Ok(denied(ticket, Denial::AlreadyScanned { scanned_on }));
    }

    info!(
        ticket_id = ticket.id,
        day = day.name(),
        scanned_by,
        "Attendee admitted"
    );

    Ok(Verdict::Admitted {
        ticket,
        day: Some(day),
        supplies: Vec::new(),
    })
}

/// Legacy single-use flow for students and exhibitors: flip the flag
/// once. The compare-and-set update closes the concurrent-scan race,
/// zero rows affected means someone else got there first.
async fn admit_single_use(
    pool: &PgPool,
    ticket: Ticket,
    now: DateTime<Utc>,
) -> Result<Verdict, AppError> {
    if ticket.is_used {
        return Ok(denied(ticket, Denial::AlreadyUsed));
    }

    let supplies = if ticket.category == TicketCategory::Exhibitor {
        fetch_supplies(pool, ticket.id).await?
    } else {
        Vec::new()
    };

    let updated =
        sqlx::query("UPDATE tickets SET is_used = TRUE, used_at = $2 WHERE id = $1 AND is_used = FALSE")
            .bind(ticket.id)
            .bind(now)
            .execute(pool)
            .await?
            .rows_affected();

    if updated == 0 {
        return Ok(denied(ticket, Denial::AlreadyUsed));
    }

    info!(
        ticket_id = ticket.id,
        category = %ticket.category,
        "Single-use ticket admitted"
    );

    Ok(Verdict::Admitted {
        ticket,
        day: None,
        supplies,
    })
}

fn denied(ticket: Ticket, denial: Denial) -> Verdict {
    Verdict::Denied {
        ticket: Some(ticket),
        denial,
    }
}

async fn existing_scan(pool: &PgPool, ticket_id: i32) -> Result<Option<TicketScan>, AppError> {
    let scan = sqlx::query_as::<_, TicketScan>("SELECT * FROM ticket_scans WHERE ticket_id = $1")
        .bind(ticket_id)
        .fetch_optional(pool)
        .await?;
    Ok(scan)
}

async fn fetch_supplies(pool: &PgPool, ticket_id: i32) -> Result<Vec<SupplyItem>, AppError> {
    let supplies = sqlx::query_as::<_, (String, i32)>(
        "SELECT supply_name, quantity FROM ticket_supplies WHERE ticket_id = $1 ORDER BY id",
    )
    .bind(ticket_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(name, quantity)| SupplyItem { name, quantity })
    .collect();
    Ok(supplies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    #[test]
    fn denial_codes_and_statuses() {
        assert_eq!(Denial::NotFound.http_status(), StatusCode::NOT_FOUND);
        for denial in [
            Denial::InvalidStatus {
                status: TicketStatus::Refunded,
            },
            Denial::ScheduleNotConfigured,
            Denial::WrongDate {
                allowed_days: vec![EventDay::Saturday],
            },
            Denial::AlreadyScanned {
                scanned_on: NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(),
            },
            Denial::AlreadyUsed,
        ] {
            assert_eq!(denial.http_status(), StatusCode::BAD_REQUEST);
        }
        assert_eq!(Denial::AlreadyUsed.code(), "ALREADY_USED");
        assert_eq!(Denial::NotFound.code(), "TICKET_NOT_FOUND");
    }

    #[test]
    fn status_messages_are_specific() {
        let refunded = Denial::InvalidStatus {
            status: TicketStatus::Refunded,
        };
        let chargeback = Denial::InvalidStatus {
            status: TicketStatus::Chargeback,
        };
        let cancelled = Denial::InvalidStatus {
            status: TicketStatus::Cancelled,
        };
        let invalid = Denial::InvalidStatus {
            status: TicketStatus::Invalid,
        };
        assert!(refunded.message().contains("refunded"));
        assert!(chargeback.message().contains("charged back"));
        assert!(cancelled.message().contains("cancelled"));
        assert!(invalid.message().contains("marked as invalid"));
    }

    #[test]
    fn wrong_date_message_lists_days() {
        let denial = Denial::WrongDate {
            allowed_days: vec![EventDay::Saturday, EventDay::Sunday],
        };
        assert_eq!(
            denial.message(),
            "This ticket is only valid on: Saturday, Sunday"
        );

        let no_days = Denial::WrongDate {
            allowed_days: Vec::new(),
        };
        assert!(no_days.message().contains("no valid admission days"));
    }

    /// A malformed UUID must be a plain not-found verdict, decided
    /// before any query runs (the lazy pool here has no server behind
    /// it, so touching the database would error out).
    #[tokio::test]
    async fn malformed_uuid_is_not_found() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unreachable")
            .unwrap();

        let verdict = verify_ticket(&pool, "not-a-uuid", 1, Utc::now())
            .await
            .unwrap();

        match verdict {
            Verdict::Denied { ticket, denial } => {
                assert!(ticket.is_none());
                assert_eq!(denial, Denial::NotFound);
            }
            Verdict::Admitted { .. } => panic!("malformed uuid must not admit"),
        }
    }
}
