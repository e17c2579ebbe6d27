use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::config::Config;
use crate::services::email::Mailer;
use crate::services::throttle::CooldownTracker;

/// Minimum gap between bulk email runs per admin account.
pub const BULK_EMAIL_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub mailer: Arc<Mailer>,
    pub bulk_email_cooldown: Arc<CooldownTracker>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let mailer = Mailer::new(config.smtp.clone(), config.admin_email.clone());
        Self {
            pool,
            config: Arc::new(config),
            mailer: Arc::new(mailer),
            bulk_email_cooldown: Arc::new(CooldownTracker::new(BULK_EMAIL_COOLDOWN)),
        }
    }
}
