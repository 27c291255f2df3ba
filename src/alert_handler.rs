use crate::{
    fcm_sender::token_prefix,
    models::{AdminUser, FcmPayload, HandlerOutcome, SosAlert},
    state::AppState,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Consumes created-alert events until the channel closes or shutdown is
/// signalled. Each event runs the full fan-out pipeline; a failed event
/// never stops the loop.
pub async fn run(
    state: Arc<AppState>,
    mut alert_rx: Receiver<(SosAlert, String)>,
    token: CancellationToken,
) -> crate::error::Result<()> {
    info!("Starting alert handler...");

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!("Alert handler cancellation received. Shutting down...");
                break;
            }

            maybe_alert = alert_rx.recv() => {
                let Some((alert, alert_id)) = maybe_alert else {
                    info!("Alert channel closed. Alert handler shutting down.");
                    break;
                };

                let outcome = handle_alert(&state, &alert, &alert_id).await;
                debug!(alert_id = %alert_id, outcome = ?outcome, "Alert handling finished");
            }
        }
    }

    info!("Alert handler shut down.");
    Ok(())
}

/// Runs the fan-out pipeline for one created alert: query admins, collect
/// tokens, build the payload, dispatch, tally.
///
/// Every failure is folded into the returned outcome; nothing escapes
/// this boundary.
pub async fn handle_alert(state: &AppState, alert: &SosAlert, alert_id: &str) -> HandlerOutcome {
    info!(alert_id = %alert_id, "SOS alert received");

    let role = state.settings.service.admin_role.as_str();
    let admins = match state.user_directory.users_with_role(role).await {
        Ok(admins) => admins,
        Err(e) => {
            error!(alert_id = %alert_id, error = %e, "Failed to query admin users");
            return HandlerOutcome::Failed(format!("admin query failed: {}", e));
        }
    };

    if admins.is_empty() {
        info!(alert_id = %alert_id, role = %role, "No admin users found");
        return HandlerOutcome::NoAdmins;
    }
    debug!(alert_id = %alert_id, admin_count = admins.len(), "Queried admin users");

    let tokens = collect_admin_tokens(&admins);
    if tokens.is_empty() {
        info!(alert_id = %alert_id, admin_count = admins.len(), "No admin FCM tokens registered");
        return HandlerOutcome::NoTokens;
    }

    info!(alert_id = %alert_id, token_count = tokens.len(), "Dispatching SOS notification");

    let payload = build_alert_payload(alert, alert_id, Utc::now());
    let report = state.fcm_client.send_multicast(&tokens, payload).await;

    info!(alert_id = %alert_id, success = report.success_count, "Dispatch completed");
    if report.failure_count > 0 {
        warn!(alert_id = %alert_id, failed = report.failure_count, "Failed to send some notifications");
        for (failed_token, send_error) in &report.token_errors {
            error!(
                alert_id = %alert_id,
                token_prefix = token_prefix(failed_token),
                error = %send_error,
                "FCM send failed for token"
            );
        }
    }

    HandlerOutcome::Dispatched(report)
}

/// Flattens admin token arrays into one deduplicated list, first-seen
/// order. Order is kept so dispatch results correlate by position.
pub fn collect_admin_tokens(admins: &[AdminUser]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();
    for admin in admins {
        for fcm_token in &admin.fcm_tokens {
            if seen.insert(fcm_token.clone()) {
                tokens.push(fcm_token.clone());
            }
        }
    }
    tokens
}

/// Maps an alert into the push payload. Absent fields take the documented
/// fallback literals; an absent creation timestamp takes the supplied
/// build-time clock. All data values are strings.
pub fn build_alert_payload(alert: &SosAlert, alert_id: &str, now: DateTime<Utc>) -> FcmPayload {
    let created_at_ms = alert
        .created_at
        .map_or_else(|| now.timestamp_millis(), |t| t.timestamp_millis());

    let mut data = HashMap::new();
    data.insert("type".to_string(), "sos_alert".to_string());
    data.insert("alertId".to_string(), alert_id.to_string());
    data.insert(
        "studentName".to_string(),
        alert
            .student_name
            .clone()
            .unwrap_or_else(|| "Unknown".to_string()),
    );
    data.insert(
        "studentId".to_string(),
        alert
            .student_id
            .clone()
            .unwrap_or_else(|| "N/A".to_string()),
    );
    data.insert(
        "location".to_string(),
        alert
            .location
            .clone()
            .unwrap_or_else(|| "Unknown location".to_string()),
    );
    data.insert(
        "category".to_string(),
        alert
            .category
            .clone()
            .unwrap_or_else(|| "emergency".to_string()),
    );
    data.insert(
        "description".to_string(),
        alert.description.clone().unwrap_or_default(),
    );
    data.insert("createdAt".to_string(), created_at_ms.to_string());

    FcmPayload {
        data: Some(data),
        // High delivery priority plus a background wake on iOS
        android: Some(serde_json::json!({ "priority": "high" })),
        apns: Some(serde_json::json!({
            "payload": {
                "aps": {
                    "sound": "default",
                    "content-available": 1,
                }
            }
        })),
    }
}
