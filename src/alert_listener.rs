use crate::{firestore, models::SosAlert, state::AppState};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Body of a Firestore document-creation event as delivered over HTTP:
/// the created document under `value`, with typed field wrappers.
#[derive(Debug, Deserialize)]
pub struct AlertEvent {
    pub value: Option<firestore::Document>,
}

struct ListenerState {
    alert_tx: Sender<(SosAlert, String)>,
    alerts_collection: String,
}

async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Accepts one created-alert event and enqueues it for handling.
///
/// Every request is acknowledged with 204, including malformed ones: the
/// event transport retries on error responses, and this pipeline has no
/// retry semantics.
async fn receive_alert(
    State(state): State<Arc<ListenerState>>,
    event: Result<Json<AlertEvent>, JsonRejection>,
) -> StatusCode {
    let event = match event {
        Ok(Json(event)) => event,
        Err(rejection) => {
            warn!(error = %rejection, "Malformed alert event body, acknowledging without dispatch");
            return StatusCode::NO_CONTENT;
        }
    };

    let Some(document) = event.value else {
        warn!("Alert event without document payload, acknowledging without dispatch");
        return StatusCode::NO_CONTENT;
    };

    let alert_id = firestore::document_id(&document.name).to_string();

    // Misrouted events for other collections are ignored
    match firestore::collection_id(&document.name) {
        Some(collection) if collection == state.alerts_collection => {}
        other => {
            debug!(
                alert_id = %alert_id,
                collection = other.unwrap_or("<none>"),
                "Event document is not in the alerts collection, ignoring"
            );
            return StatusCode::NO_CONTENT;
        }
    }

    let alert = firestore::alert_from_fields(&document.fields);
    debug!(alert_id = %alert_id, "Enqueueing alert for handling");

    if state.alert_tx.send((alert, alert_id.clone())).await.is_err() {
        // Handler task is gone; shutdown is in progress
        error!(alert_id = %alert_id, "Alert channel closed, dropping event");
    }

    StatusCode::NO_CONTENT
}

pub fn router(alert_tx: Sender<(SosAlert, String)>, alerts_collection: &str) -> Router {
    let state = Arc::new(ListenerState {
        alert_tx,
        alerts_collection: alerts_collection.to_string(),
    });

    Router::new()
        .route("/", post(receive_alert))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Binds the ingress server and serves until the token is cancelled.
pub async fn run(
    state: Arc<AppState>,
    alert_tx: Sender<(SosAlert, String)>,
    token: CancellationToken,
) {
    let app = router(alert_tx, &state.settings.service.alerts_collection);

    let listen_addr_str = &state.settings.server.listen_addr;
    let addr: SocketAddr = match listen_addr_str.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(
                "Invalid server.listen_addr '{}': {}. Exiting listener task.",
                listen_addr_str, e
            );
            token.cancel();
            return;
        }
    };

    info!("Alert ingress listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind alert ingress: {}", e);
            token.cancel();
            return;
        }
    };

    let shutdown_token = token.clone();
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_token.cancelled().await;
            info!("Alert ingress shutting down.");
        })
        .await
    {
        error!("Alert ingress error: {}", e);
        token.cancel();
    }
}
