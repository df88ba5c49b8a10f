//! Pledge checkout service: entry point.
//!
//! Hosts checkout sessions for a crowdfunding client behind a small Axum REST
//! API. Payments go through the marketplace GraphQL backend, and every
//! completed checkout is recorded in SQLite.

mod api;
mod config;
mod db;
mod errors;
mod graphql;
mod records;
mod sessions;

#[cfg(test)]
mod test_api;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use graphql::GraphQlClient;
use sessions::SessionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env()
        .and_then(Config::validated)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;

    // HTTP client for the GraphQL backend.
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
        .build()?;
    let graphql = Arc::new(GraphQlClient::new(
        client,
        config.api_url.clone(),
        config.api_token.clone(),
    ));

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState {
        pool,
        registry: SessionRegistry::new(),
        checkout_api: graphql.clone(),
        shipping: graphql,
        config: config.checkout.clone(),
    });

    let app = router(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: Arc<api::ApiState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/sessions", post(api::open_session))
        .route(
            "/sessions/:id",
            get(api::get_session).delete(api::close_session),
        )
        .route("/sessions/:id/reward", post(api::select_reward))
        .route("/sessions/:id/confirm", post(api::confirm_selection))
        .route(
            "/sessions/:id/add-ons/:add_on_id",
            put(api::set_add_on_quantity),
        )
        .route("/sessions/:id/shipping", post(api::select_shipping))
        .route("/sessions/:id/pledge", put(api::set_pledge_amount))
        .route("/sessions/:id/pledge/increase", post(api::increase_pledge))
        .route("/sessions/:id/pledge/decrease", post(api::decrease_pledge))
        .route("/sessions/:id/bonus/increase", post(api::increase_bonus))
        .route("/sessions/:id/bonus/decrease", post(api::decrease_bonus))
        .route("/sessions/:id/checkout", post(api::submit_checkout))
        .route("/checkouts", get(api::get_checkouts))
        .route("/cards", get(api::get_stored_cards))
        .route("/setup-intents", post(api::create_setup_intent))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
