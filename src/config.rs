use serde::Deserialize;

// Re-export config crate error if needed, or use custom error
pub use config::ConfigError;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub service: ServiceSettings,
    pub firestore: FirestoreSettings,
    pub fcm: FcmSettings,
    #[serde(default = "default_server_settings")]
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceSettings {
    /// Deployment region identifier. Recorded in logs; the Google
    /// endpoints themselves are global.
    pub region: String,
    #[serde(default = "default_admin_role")]
    pub admin_role: String,
    #[serde(default = "default_users_collection")]
    pub users_collection: String,
    #[serde(default = "default_alerts_collection")]
    pub alerts_collection: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FirestoreSettings {
    pub project_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FcmSettings {
    pub project_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_server_settings() -> ServerSettings {
    ServerSettings {
        listen_addr: default_listen_addr(),
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_admin_role() -> String {
    "admin".to_string()
}

fn default_users_collection() -> String {
    "users".to_string()
}

fn default_alerts_collection() -> String {
    "sosAlerts".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_dir = std::env::current_dir().expect("Failed to get current dir");
        let config_path = config_dir.join("config").join("settings.yaml");

        let s = config::Config::builder()
            .add_source(config::File::from(config_path).required(true))
            // Eg.. `SOS_PUSH__FCM__PROJECT_ID=...` would override `fcm.project_id`
            .add_source(config::Environment::with_prefix("SOS_PUSH").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
