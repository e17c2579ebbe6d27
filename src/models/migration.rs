use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ticket::SupplyItem;

/// One ticket as it travels between instances. Categories and statuses
/// are carried as strings and validated on the receiving side so a
/// malformed row is rejected before anything is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationTicket {
    pub uuid: Uuid,
    pub category: String,
    pub subtype: Option<String>,
    pub name: String,
    pub teacher_name: Option<String>,
    pub email: String,
    pub status: String,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub scans: Vec<MigrationScan>,
    #[serde(default)]
    pub supplies: Vec<SupplyItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationScan {
    pub scanned_at: DateTime<Utc>,
    pub scan_date: NaiveDate,
}

/// Body of POST /api/migration/receive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationPayload {
    pub secret: String,
    pub tickets: Vec<MigrationTicket>,
}

/// Body of POST /api/migration/send: where to push our data and the
/// secret the peer instance expects.
#[derive(Debug, Clone, Deserialize)]
pub struct MigrationSendRequest {
    pub target_url: String,
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReceiveReport {
    pub inserted: usize,
    pub updated: usize,
    pub scans_imported: usize,
}
