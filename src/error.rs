use crate::fcm_sender::FcmError;
use crate::firestore::FirestoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Firestore error: {0}")]
    Firestore(#[from] FirestoreError),

    #[error("FCM error: {0}")]
    Fcm(#[from] FcmError),

    #[error("GCP auth error: {0}")]
    Auth(#[from] gcp_auth::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;
