//! sos_push_service Library Crate

// Declare modules as public to be accessible from the binary crate and integration tests
pub mod alert_handler;
pub mod alert_listener;
pub mod config;
pub mod error;
pub mod fcm_sender;
pub mod firestore;
pub mod models;
pub mod state;
