use crate::models::{DispatchReport, FcmPayload};
use async_trait::async_trait;
use gcp_auth::TokenProvider;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing;

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FcmError {
    #[error("Initialization error: {0}")]
    Initialization(String),
    #[error("Auth token error: {0}")]
    Auth(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("FCM indicated token is not registered or invalid")]
    TokenNotRegistered,
    #[error("Unknown FCM error: code={code}, hint={hint:?}")]
    Unknown { code: u16, hint: Option<String> },
}

/// Classifies a non-success HTTP v1 response.
///
/// 404 and SENDER_ID_MISMATCH mean the token will never work again;
/// UNREGISTERED covers stale tokens reported on a 400.
fn classify_failure(status: u16, body: &str) -> FcmError {
    match status {
        404 => FcmError::TokenNotRegistered,
        400 if body.contains("UNREGISTERED") => FcmError::TokenNotRegistered,
        403 if body.contains("SENDER_ID_MISMATCH") => FcmError::TokenNotRegistered,
        400 => FcmError::InvalidRequest(snippet(body)),
        401 | 403 => FcmError::Unauthorized(snippet(body)),
        code => FcmError::Unknown {
            code,
            hint: if body.is_empty() {
                None
            } else {
                Some(snippet(body))
            },
        },
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

/// Tokens are logged by prefix only.
pub fn token_prefix(token: &str) -> &str {
    &token[..token.len().min(8)]
}

// Define the trait for sending FCM messages
#[async_trait]
pub trait FcmSend: Send + Sync {
    async fn send_single(
        &self,
        token: &str,
        payload: FcmPayload,
    ) -> std::result::Result<(), FcmError>;
}

// Implementation speaking the FCM HTTP v1 API
struct RestFcmClient {
    http: reqwest::Client,
    auth: Arc<dyn TokenProvider>,
    endpoint: String,
}

impl RestFcmClient {
    fn new(
        http: reqwest::Client,
        auth: Arc<dyn TokenProvider>,
        project_id: &str,
    ) -> Result<Self, FcmError> {
        if project_id.is_empty() {
            return Err(FcmError::Initialization(
                "FCM project id is empty".to_string(),
            ));
        }
        Ok(RestFcmClient {
            http,
            auth,
            endpoint: format!(
                "https://fcm.googleapis.com/v1/projects/{}/messages:send",
                project_id
            ),
        })
    }

    async fn bearer(&self) -> Result<String, FcmError> {
        self.auth
            .token(&[FCM_SCOPE])
            .await
            .map(|t| t.as_str().to_owned())
            .map_err(|e| FcmError::Auth(e.to_string()))
    }
}

#[async_trait]
impl FcmSend for RestFcmClient {
    /// Sends a notification payload to a single FCM token over HTTP v1.
    async fn send_single(
        &self,
        token: &str,
        payload: FcmPayload,
    ) -> std::result::Result<(), FcmError> {
        let bearer = self.bearer().await?;

        let mut message = json!({ "token": token });
        if let Some(data) = &payload.data {
            message["data"] = json!(data);
        }
        if let Some(android) = &payload.android {
            message["android"] = android.clone();
        }
        if let Some(apns) = &payload.apns {
            message["apns"] = apns.clone();
        }
        let body = json!({ "message": message });

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&bearer)
            .json(&body)
            .send()
            .await
            .map_err(|e| FcmError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(
                "FCM send successful for token prefix {}",
                token_prefix(token)
            );
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let custom_error = classify_failure(status.as_u16(), &text);
        tracing::error!(
            "FCM send failed for token prefix {}: {:?}",
            token_prefix(token),
            custom_error
        );
        Err(custom_error)
    }
}

// The public FcmClient holds a trait object
pub struct FcmClient {
    client: Box<dyn FcmSend>,
}

impl FcmClient {
    pub fn new(
        http: reqwest::Client,
        auth: Arc<dyn TokenProvider>,
        project_id: &str,
    ) -> Result<Self, FcmError> {
        let real_client = RestFcmClient::new(http, auth, project_id)?;
        Ok(FcmClient {
            client: Box::new(real_client),
        })
    }

    // Constructor for injecting a mock/custom implementation (for testing)
    pub fn new_with_impl(client_impl: Box<dyn FcmSend>) -> Self {
        FcmClient {
            client: client_impl,
        }
    }

    /// Sends one payload to every token, in order, as a single multicast
    /// call. HTTP v1 has no batch endpoint, so each token gets its own
    /// send; the report correlates outcomes by position. Failed tokens
    /// are reported, never resent.
    pub async fn send_multicast(&self, tokens: &[String], payload: FcmPayload) -> DispatchReport {
        let mut report = DispatchReport::default();
        for token in tokens {
            match self.client.send_single(token, payload.clone()).await {
                Ok(()) => report.success_count += 1,
                Err(e) => {
                    report.failure_count += 1;
                    report.token_errors.push((token.clone(), e));
                }
            }
        }
        report
    }

    /// Sends a notification payload to a single FCM token.
    /// Delegates directly to the underlying FcmSend implementation.
    pub async fn send_single(
        &self,
        token: &str,
        payload: FcmPayload,
    ) -> std::result::Result<(), FcmError> {
        self.client.send_single(token, payload).await
    }
}

// Mock FCM sender, public so integration tests can use it
#[derive(Clone, Default)]
pub struct MockFcmSender {
    sent_messages: Arc<Mutex<Vec<(String, FcmPayload)>>>,
    error_tokens: Arc<Mutex<HashMap<String, FcmError>>>,
}

impl MockFcmSender {
    pub fn new() -> Self {
        Self {
            sent_messages: Arc::new(Mutex::new(Vec::new())),
            error_tokens: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    // Helper to retrieve sent messages for assertions
    pub fn get_sent_messages(&self) -> Vec<(String, FcmPayload)> {
        self.sent_messages.lock().unwrap().clone()
    }

    // Helper to simulate errors for specific tokens
    pub fn set_error_for_token(&self, token: &str, error: FcmError) {
        self.error_tokens
            .lock()
            .unwrap()
            .insert(token.to_string(), error);
    }

    // Helper to clear recorded messages and errors (useful between tests)
    pub fn clear(&self) {
        self.sent_messages.lock().unwrap().clear();
        self.error_tokens.lock().unwrap().clear();
    }
}

#[async_trait]
impl FcmSend for MockFcmSender {
    async fn send_single(
        &self,
        token: &str,
        payload: FcmPayload,
    ) -> std::result::Result<(), FcmError> {
        if let Some(error) = self.error_tokens.lock().unwrap().get(token) {
            tracing::warn!(
                "MockFcmSender: Simulating error {:?} for token prefix {}",
                error,
                token_prefix(token)
            );
            return Err(error.clone());
        }

        tracing::debug!(
            "MockFcmSender: Recording send for token prefix {}...",
            token_prefix(token)
        );
        let mut messages = self.sent_messages.lock().unwrap();
        messages.push((token.to_string(), payload));
        Ok(())
    }
}
