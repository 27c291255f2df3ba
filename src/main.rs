use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing_subscriber::EnvFilter;

use sos_push_service::alert_handler;
use sos_push_service::alert_listener;
use sos_push_service::config;
use sos_push_service::error::Result;
use sos_push_service::models::SosAlert;
use sos_push_service::state;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .init();

    tracing::info!("Starting SOS Push Service...");

    let settings = config::Settings::new()?;
    tracing::info!(region = %settings.service.region, "Configuration loaded successfully");

    let app_state = Arc::new(state::AppState::new(settings).await?);
    tracing::info!("Application state initialized (Firestore client, FCM client)");

    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    let (alert_tx, alert_rx) = tokio::sync::mpsc::channel::<(SosAlert, String)>(1000);

    let state_handler = Arc::clone(&app_state);
    let token_handler = token.clone();
    tracker.spawn(async move {
        if let Err(e) = alert_handler::run(state_handler, alert_rx, token_handler).await {
            tracing::error!("Alert handler failed: {}", e);
        }
        tracing::info!("Alert handler task finished.");
    });
    tracing::info!("Alert handler started");

    let state_listener = Arc::clone(&app_state);
    let token_listener = token.clone();
    tracker.spawn(async move {
        alert_listener::run(state_listener, alert_tx, token_listener).await;
        tracing::info!("Alert listener task finished.");
    });
    tracing::info!("Alert listener started");

    tracker.close();

    // Wait for either Ctrl+C or cancellation (from a failed task)
    let token_cancelled = token.child_token();
    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
        _ = token_cancelled.cancelled() => {
            tracing::info!("Shutdown triggered by task failure");
        }
    }

    tracing::info!("Shutting down services...");

    token.cancel();
    tracker.wait().await;

    tracing::info!("SOS Push Service stopped.");
    Ok(())
}
