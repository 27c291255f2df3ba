// Common builders for the integration suites

use sos_push_service::config::{
    FcmSettings, FirestoreSettings, ServerSettings, ServiceSettings, Settings,
};
use sos_push_service::fcm_sender::{FcmClient, MockFcmSender};
use sos_push_service::firestore::MockUserDirectory;
use sos_push_service::models::{AdminUser, SosAlert};
use sos_push_service::state::AppState;
use std::sync::Arc;

pub fn test_settings() -> Settings {
    Settings {
        service: ServiceSettings {
            region: "asia-southeast1".to_string(),
            admin_role: "admin".to_string(),
            users_collection: "users".to_string(),
            alerts_collection: "sosAlerts".to_string(),
        },
        firestore: FirestoreSettings {
            project_id: "test-project".to_string(),
        },
        fcm: FcmSettings {
            project_id: "test-project".to_string(),
        },
        server: ServerSettings {
            listen_addr: "127.0.0.1:0".to_string(),
        },
    }
}

/// State wired to mock ports, returned alongside the mocks for
/// scripting and assertions.
pub fn state_with_mocks(users: Vec<AdminUser>) -> (Arc<AppState>, MockUserDirectory, MockFcmSender) {
    let directory = MockUserDirectory::new();
    directory.set_users(users);

    let sender = MockFcmSender::new();
    let fcm_client = FcmClient::new_with_impl(Box::new(sender.clone()));

    let state = AppState::new_with_ports(
        test_settings(),
        Arc::new(directory.clone()),
        Arc::new(fcm_client),
    );
    (Arc::new(state), directory, sender)
}

pub fn admin_with_tokens(tokens: &[&str]) -> AdminUser {
    AdminUser {
        role: "admin".to_string(),
        fcm_tokens: tokens.iter().map(|t| t.to_string()).collect(),
    }
}

pub fn sample_alert() -> SosAlert {
    SosAlert {
        student_name: Some("Alice".to_string()),
        student_id: Some("S-042".to_string()),
        location: Some("Block C".to_string()),
        category: Some("fire".to_string()),
        description: Some("smoke in corridor".to_string()),
        created_at: None,
    }
}
