use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Audit record for every order webhook received, successful or not.
/// The raw payload is kept so failed orders can be replayed by hand.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookLog {
    pub id: i32,
    pub order_id: Option<String>,
    pub webhook_type: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub error_message: Option<String>,
    pub tickets_created: i32,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// List row: everything except the raw payload, which is only served
/// from the by-id endpoint.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WebhookLogRow {
    pub id: i32,
    pub order_id: Option<String>,
    pub webhook_type: String,
    pub processed: bool,
    pub error_message: Option<String>,
    pub tickets_created: i32,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListWebhooksQuery {
    pub processed: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookLogPage {
    pub logs: Vec<WebhookLogRow>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WebhookSummary {
    pub total_webhooks: i64,
    pub processed_webhooks: i64,
    pub unprocessed_webhooks: i64,
    pub webhooks_with_errors: i64,
    pub total_tickets_created: i64,
}

/// Order intake payload posted by the storefront integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub name: String,
    pub email: String,
    pub subtype: String,
    pub quantity: Option<i32>,
    pub order_id: Option<String>,
}

/// Per-ticket result line in the order intake response.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedTicket {
    pub id: i32,
    pub uuid: uuid::Uuid,
    pub email_sent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub tickets: Vec<CreatedTicket>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
    /// True when the order id had been processed before and the
    /// existing tickets were returned instead of new ones.
    pub already_processed: bool,
}
