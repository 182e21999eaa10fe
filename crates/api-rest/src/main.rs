//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own, without the background reminder poller.
//!
//! ## Intended use
//! Development and debugging against the API and its Swagger UI. The workspace's main
//! `clinic-run` binary also schedules medication reminders.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the clinic REST API server
///
/// # Environment Variables
/// - `CLINIC_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `CLINIC_DATA_DIR`: Store directory (default: "clinic_data")
/// - `AUTH_TOKEN_SECRET`: Bearer token secret (required)
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or the store cannot be opened,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("clinic_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = api_rest::config::rest_addr_from_env();
    let state = api_rest::config::state_from_env()?;

    tracing::info!("-- Starting clinic REST API on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, api_rest::build_router(state)).await?;

    Ok(())
}
