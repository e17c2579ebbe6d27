use std::env;

use tracing::warn;
use uuid::Uuid;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

/// SMTP relay settings. Absent entirely when the deployment has no
/// mail configured; the notification service then skips every send.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Base URL of the ticket-holder frontend; QR codes and email
    /// links point here.
    pub frontend_url: String,
    /// Shared key the storefront presents in X-Api-Key. When unset
    /// the order webhook rejects everything.
    pub order_api_key: Option<String>,
    /// Where operational alert emails go.
    pub admin_email: Option<String>,
    pub smtp: Option<SmtpConfig>,
}

impl Config {
    pub fn from_env() -> Self {
        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
            warn!("DATABASE_URL not set, using local default");
            "postgres://localhost/tessera".to_string()
        });

        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let frontend_url = env::var("FRONTEND_URL").unwrap_or_else(|_| {
            warn!("FRONTEND_URL not set, QR codes will point at localhost");
            "http://localhost:5173".to_string()
        });

        let order_api_key = env::var("ORDER_API_KEY").ok().filter(|k| !k.is_empty());
        if order_api_key.is_none() {
            warn!("ORDER_API_KEY not set, order webhook will reject all requests");
        }

        let admin_email = env::var("ADMIN_EMAIL").ok().filter(|e| !e.is_empty());

        let smtp = smtp_from_env();
        if smtp.is_none() {
            warn!("SMTP not configured, ticket emails will be skipped");
        }

        Self {
            database_url,
            port,
            frontend_url,
            order_api_key,
            admin_email,
            smtp,
        }
    }

    /// The URL a ticket QR code resolves to.
    pub fn verify_url(&self, ticket_uuid: Uuid) -> String {
        format!(
            "{}/verify/{}",
            self.frontend_url.trim_end_matches('/'),
            ticket_uuid
        )
    }
}

fn smtp_from_env() -> Option<SmtpConfig> {
    let host = env::var("SMTP_HOST").ok().filter(|v| !v.is_empty())?;
    let username = env::var("SMTP_USER").ok().filter(|v| !v.is_empty())?;
    let password = env::var("SMTP_PASS").ok().filter(|v| !v.is_empty())?;

    let port = env::var("SMTP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(587);

    let from_address = env::var("EMAIL_FROM").unwrap_or_else(|_| username.clone());

    Some(SmtpConfig {
        host,
        port,
        username,
        password,
        from_address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_url_handles_trailing_slash() {
        let config = Config {
            database_url: String::new(),
            port: 8080,
            frontend_url: "https://tickets.example.com/".to_string(),
            order_api_key: None,
            admin_email: None,
            smtp: None,
        };
        let uuid = Uuid::nil();
        assert_eq!(
            config.verify_url(uuid),
            format!("https://tickets.example.com/verify/{}", uuid)
        );
    }
}
