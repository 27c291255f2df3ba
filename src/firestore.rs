use crate::models::{AdminUser, SosAlert};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gcp_auth::TokenProvider;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing;

const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

#[derive(Error, Debug)]
pub enum FirestoreError {
    #[error("Auth token error: {0}")]
    Auth(String),
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Query failed: status={status}, hint={hint}")]
    Query { status: u16, hint: String },
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// One typed Firestore value wrapper, e.g. `{"stringValue": "..."}`.
/// Only the variants this service reads are modeled; anything else
/// decodes to an empty wrapper and is ignored.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldValue {
    pub string_value: Option<String>,
    pub integer_value: Option<String>,
    pub timestamp_value: Option<DateTime<Utc>>,
    pub array_value: Option<ArrayValue>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ArrayValue {
    pub values: Vec<FieldValue>,
}

/// A Firestore document: full resource name plus typed field map.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub name: String,
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
}

/// The trailing path segment of a document name is its id.
pub fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// The collection id a document belongs to (second-to-last path segment).
pub fn collection_id(name: &str) -> Option<&str> {
    let mut segments = name.rsplit('/');
    segments.next()?;
    segments.next()
}

pub fn string_field(fields: &HashMap<String, FieldValue>, name: &str) -> Option<String> {
    fields.get(name).and_then(|v| v.string_value.clone())
}

pub fn timestamp_field(fields: &HashMap<String, FieldValue>, name: &str) -> Option<DateTime<Utc>> {
    fields.get(name).and_then(|v| v.timestamp_value)
}

/// A missing or non-array field decodes to an empty vec, not an error.
/// Non-string entries inside the array are skipped.
pub fn string_array_field(fields: &HashMap<String, FieldValue>, name: &str) -> Vec<String> {
    fields
        .get(name)
        .and_then(|v| v.array_value.as_ref())
        .map(|array| {
            array
                .values
                .iter()
                .filter_map(|v| v.string_value.clone())
                .collect()
        })
        .unwrap_or_default()
}

pub fn alert_from_fields(fields: &HashMap<String, FieldValue>) -> SosAlert {
    SosAlert {
        student_name: string_field(fields, "studentName"),
        student_id: string_field(fields, "studentId"),
        location: string_field(fields, "location"),
        category: string_field(fields, "category"),
        description: string_field(fields, "description"),
        created_at: timestamp_field(fields, "createdAt"),
    }
}

pub fn admin_user_from_document(document: &Document) -> AdminUser {
    AdminUser {
        role: string_field(&document.fields, "role").unwrap_or_default(),
        fcm_tokens: string_array_field(&document.fields, "fcmTokens"),
    }
}

// Define the trait for the user-collection read port
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn users_with_role(&self, role: &str) -> Result<Vec<AdminUser>, FirestoreError>;
}

/// Entries in a `runQuery` response stream; result rows carry a document,
/// progress rows only a read time.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResult {
    document: Option<Document>,
}

// Implementation speaking the Firestore REST API
pub struct FirestoreClient {
    http: reqwest::Client,
    auth: Arc<dyn TokenProvider>,
    query_url: String,
    users_collection: String,
}

impl FirestoreClient {
    pub fn new(
        http: reqwest::Client,
        auth: Arc<dyn TokenProvider>,
        project_id: &str,
        users_collection: &str,
    ) -> Self {
        FirestoreClient {
            http,
            auth,
            query_url: format!(
                "https://firestore.googleapis.com/v1/projects/{}/databases/(default)/documents:runQuery",
                project_id
            ),
            users_collection: users_collection.to_string(),
        }
    }

    async fn bearer(&self) -> Result<String, FirestoreError> {
        self.auth
            .token(&[DATASTORE_SCOPE])
            .await
            .map(|t| t.as_str().to_owned())
            .map_err(|e| FirestoreError::Auth(e.to_string()))
    }
}

#[async_trait]
impl UserDirectory for FirestoreClient {
    /// Runs a structured query for every user document whose `role` field
    /// equals the given role.
    async fn users_with_role(&self, role: &str) -> Result<Vec<AdminUser>, FirestoreError> {
        let bearer = self.bearer().await?;

        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": self.users_collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": "role" },
                        "op": "EQUAL",
                        "value": { "stringValue": role },
                    }
                }
            }
        });

        let response = self
            .http
            .post(&self.query_url)
            .bearer_auth(&bearer)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let hint: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            tracing::error!(status = status.as_u16(), hint = %hint, "Firestore query failed");
            return Err(FirestoreError::Query {
                status: status.as_u16(),
                hint,
            });
        }

        let rows: Vec<QueryResult> = response.json().await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.document)
            .map(|document| admin_user_from_document(&document))
            .collect())
    }
}

// Mock user directory, public so integration tests can use it
#[derive(Clone, Default)]
pub struct MockUserDirectory {
    users: Arc<Mutex<Vec<AdminUser>>>,
    fail_with: Arc<Mutex<Option<String>>>,
    queried_roles: Arc<Mutex<Vec<String>>>,
}

impl MockUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_users(&self, users: Vec<AdminUser>) {
        *self.users.lock().unwrap() = users;
    }

    // Makes every subsequent query fail with the given message
    pub fn set_failure(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }

    // Helper to retrieve queried roles for assertions
    pub fn get_queried_roles(&self) -> Vec<String> {
        self.queried_roles.lock().unwrap().clone()
    }
}

#[async_trait]
impl UserDirectory for MockUserDirectory {
    async fn users_with_role(&self, role: &str) -> Result<Vec<AdminUser>, FirestoreError> {
        self.queried_roles.lock().unwrap().push(role.to_string());

        if let Some(message) = self.fail_with.lock().unwrap().as_ref() {
            return Err(FirestoreError::Unavailable(message.clone()));
        }

        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .filter(|user| user.role == role)
            .cloned()
            .collect())
    }
}
