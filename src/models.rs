use crate::fcm_sender::FcmError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An SOS alert document as created by the mobile app.
///
/// Every field may be absent; `build_alert_payload` substitutes the
/// documented fallback literals when mapping into the push payload.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SosAlert {
    pub student_name: Option<String>,
    pub student_id: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A record from the `users` collection. Read-only to this service; the
/// mobile app registers and unregisters the tokens.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    pub role: String,
    #[serde(default)]
    pub fcm_tokens: Vec<String>,
}

// Structure for the FCM message payload.
// See: https://firebase.google.com/docs/reference/fcm/rest/v1/projects.messages#Message
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FcmPayload {
    /// String-valued data fields; FCM data messages accept no other value
    /// type.
    pub data: Option<HashMap<String, String>>,

    // Platform specific overrides (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub android: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apns: Option<serde_json::Value>,
}

/// Per-token tally for one multicast dispatch.
///
/// `success_count + failure_count` always equals the number of tokens
/// handed to the dispatcher; `token_errors` holds one entry per failed
/// token, in dispatch order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub success_count: usize,
    pub failure_count: usize,
    pub token_errors: Vec<(String, FcmError)>,
}

/// What one alert invocation amounted to.
///
/// The no-op branches are explicit variants rather than a bare null so
/// callers and tests can tell "no admins" from a provider outage.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    Dispatched(DispatchReport),
    NoAdmins,
    NoTokens,
    Failed(String),
}
