use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A recorded admission. `scan_date` is the calendar day in the
/// event's timezone at the moment of the scan, which is what the
/// duplicate checks and the stats page reason about.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketScan {
    pub id: i32,
    pub ticket_id: i32,
    pub scanned_at: DateTime<Utc>,
    pub scan_date: NaiveDate,
    pub scanned_by_user_id: Option<i32>,
}
