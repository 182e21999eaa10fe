use chrono::Utc;
use clinic_core::integrations::MessageSender;
use clinic_core::services::reminders::run_reminder_poll;
use clinic_core::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the clinic service
///
/// Serves the REST API and, when a reminder webhook is configured, polls prescriptions for due
/// medication doses in the background. Stops cleanly on ctrl-c.
///
/// # Environment Variables
/// - `CLINIC_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CLINIC_DATA_DIR`: Store directory (default: "clinic_data")
/// - `AUTH_TOKEN_SECRET`: Bearer token secret (required)
/// - `REMINDER_WEBHOOK_URL`: Enables the reminder poller
/// - `REMINDER_POLL_SECONDS`: Poll interval (default: 60)
///
/// # Returns
/// * `Ok(())` - If the server runs and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, startup or serving fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinic_run=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("clinic_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = api_rest::config::rest_addr_from_env();
    let poll_every = api_rest::config::reminder_poll_interval_from_env()?;
    let state = api_rest::config::state_from_env()?;

    tracing::info!("++ Starting clinic REST on {}", rest_addr);

    let poller = state.reminders.clone().map(|sender| {
        tracing::info!("++ Polling medication reminders every {}s", poll_every.as_secs());
        tokio::spawn(poll_reminders(
            state.store.clone(),
            sender,
            state.cfg.reminder_window_minutes(),
            poll_every,
        ))
    });

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, api_rest::build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(poller) = poller {
        poller.abort();
    }
    tracing::info!("-- Clinic service stopped");

    Ok(())
}

async fn poll_reminders(
    store: Arc<Store>,
    sender: Arc<dyn MessageSender>,
    window_minutes: u32,
    every: Duration,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        match run_reminder_poll(&store, sender.as_ref(), Utc::now(), window_minutes).await {
            Ok(logs) if !logs.is_empty() => {
                tracing::info!("reminder poll recorded {} deliveries", logs.len())
            }
            Ok(_) => {}
            Err(e) => tracing::error!("reminder poll failed: {e}"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("-- Shutdown requested");
}
