use crate::{
    config::Settings,
    error::{Result, ServiceError},
    fcm_sender::FcmClient,
    firestore::{FirestoreClient, UserDirectory},
};
use std::sync::Arc;

/// Shared application state: explicit, process-wide client handles built
/// once at startup and injected into the handler.
pub struct AppState {
    pub settings: Settings,
    pub user_directory: Arc<dyn UserDirectory>,
    pub fcm_client: Arc<FcmClient>,
}

impl AppState {
    pub async fn new(settings: Settings) -> Result<Self> {
        bootstrap_credentials()?;

        let http = reqwest::Client::new();
        // One token provider serves both Google clients
        let auth = gcp_auth::provider().await?;

        let firestore_client = FirestoreClient::new(
            http.clone(),
            Arc::clone(&auth),
            &settings.firestore.project_id,
            &settings.service.users_collection,
        );
        tracing::info!(
            project_id = %settings.firestore.project_id,
            "Initialized Firestore client"
        );

        let fcm_client = FcmClient::new(http, auth, &settings.fcm.project_id)?;
        tracing::info!(project_id = %settings.fcm.project_id, "Initialized FCM client");

        Ok(AppState {
            settings,
            user_directory: Arc::new(firestore_client),
            fcm_client: Arc::new(fcm_client),
        })
    }

    /// Assembles state over injected ports. Used by tests.
    pub fn new_with_ports(
        settings: Settings,
        user_directory: Arc<dyn UserDirectory>,
        fcm_client: Arc<FcmClient>,
    ) -> Self {
        AppState {
            settings,
            user_directory,
            fcm_client,
        }
    }
}

/// Decodes base64 service-account credentials from the environment into a
/// temporary file and points GOOGLE_APPLICATION_CREDENTIALS at it. No-op
/// when the variable is unset.
fn bootstrap_credentials() -> Result<()> {
    let Ok(credentials_base64) = std::env::var("SOS_PUSH__GCP__CREDENTIALS_BASE64") else {
        return Ok(());
    };
    if credentials_base64.is_empty() {
        return Ok(());
    }

    use base64::Engine;
    let credentials_json = base64::engine::general_purpose::STANDARD
        .decode(&credentials_base64)
        .map_err(|e| ServiceError::Internal(format!("Failed to decode base64 credentials: {}", e)))?;

    let creds_path = std::env::temp_dir().join("sos-push-service-account.json");
    std::fs::write(&creds_path, credentials_json)?;
    std::env::set_var("GOOGLE_APPLICATION_CREDENTIALS", &creds_path);
    tracing::info!("Wrote GCP credentials to temporary file: {:?}", creds_path);

    Ok(())
}
