use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{
    auth, bulk_email, health_check, migration, orders, settings, stats, tickets, users, verify,
    webhooks,
};
use crate::middleware::lockdown::lockdown_gate;
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    // Only the routes that create tickets or consume scans honor
    // lockdown; admin and read paths keep working so the operator can
    // turn it back off.
    let lockdown = from_fn_with_state(state.clone(), lockdown_gate);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/verifier-login", post(auth::verifier_login));

    let user_routes = Router::new().route("/change-password", post(users::change_password));

    let ticket_routes = Router::new()
        .route("/", get(tickets::list_tickets))
        .route("/", post(tickets::create_ticket).layer(lockdown.clone()))
        .route("/:id", delete(tickets::delete_ticket))
        .route("/:id/resend", post(tickets::resend_email))
        .route("/:id/status", patch(tickets::update_status))
        .route("/:id/scans", delete(tickets::clear_scans));

    let verify_routes = Router::new()
        .route("/:uuid", post(verify::verify_scan))
        .route_layer(lockdown.clone());

    let order_routes = Router::new()
        .route("/", post(orders::order_intake).layer(lockdown))
        .route("/health", get(orders::orders_health));

    let webhook_routes = Router::new()
        .route("/", get(webhooks::list_webhooks))
        .route("/stats/summary", get(webhooks::webhook_summary))
        .route("/:id", get(webhooks::get_webhook));

    let settings_routes = Router::new()
        .route("/", get(settings::get_settings))
        .route("/", put(settings::update_settings));

    let stats_routes = Router::new().route("/", get(stats::usage_stats));

    let bulk_email_routes = Router::new()
        .route("/preview", post(bulk_email::preview))
        .route("/test", post(bulk_email::send_test))
        .route("/send", post(bulk_email::send));

    let migration_routes = Router::new()
        .route("/receive", post(migration::receive_migration))
        .route("/send", post(migration::send_migration));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api/user", user_routes)
        .nest("/api/tickets", ticket_routes)
        .nest("/api/verify", verify_routes)
        .nest("/api/orders", order_routes)
        .nest("/api/webhooks", webhook_routes)
        .nest("/api/settings", settings_routes)
        .nest("/api/stats", stats_routes)
        .nest("/api/bulk-email", bulk_email_routes)
        .nest("/api/migration", migration_routes)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer())
        .layer(create_cors_layer())
        .with_state(state)
}
