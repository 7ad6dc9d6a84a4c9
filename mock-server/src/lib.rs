//! In-memory stand-in for the WowSQL HTTP API.
//!
//! Serves the database, schema, storage and auth endpoints the SDK talks to,
//! with enough behavior (filters, quotas, sessions, key privileges) for
//! end-to-end tests. Nothing is persisted.

mod auth;
mod db;
mod schema;
mod storage;

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};

pub const ANON_KEY: &str = "wowsql_anon_test";
pub const SERVICE_KEY: &str = "wowsql_service_test";
/// Code accepted by `/api/auth/otp/verify`.
pub const MOCK_OTP: &str = "123456";
pub const DEFAULT_QUOTA_BYTES: u64 = 1024 * 1024;

pub type Row = Map<String, Value>;

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub quota_bytes: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            quota_bytes: DEFAULT_QUOTA_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct TableData {
    pub columns: Vec<Value>,
    pub primary_key: Option<String>,
    pub rows: Vec<Row>,
    pub next_id: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct StoredFile {
    pub data: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub(crate) struct UserRecord {
    pub id: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub email_verified: bool,
    pub user_metadata: Value,
}

#[derive(Debug, Default)]
pub(crate) struct Backend {
    pub tables: HashMap<String, TableData>,
    pub files: BTreeMap<String, StoredFile>,
    pub quota_bytes: u64,
    pub users: HashMap<String, UserRecord>,
    /// access token -> email
    pub sessions: HashMap<String, String>,
    /// reset token -> email
    pub reset_tokens: HashMap<String, String>,
}

impl Backend {
    pub fn used_bytes(&self) -> u64 {
        self.files.values().map(|f| f.data.len() as u64).sum()
    }
}

pub(crate) type Db = Arc<RwLock<Backend>>;

/// Error response with a `{"detail": ...}` body.
#[derive(Debug)]
pub(crate) struct Failure {
    status: StatusCode,
    body: Value,
}

impl Failure {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "detail": detail.into() }),
        }
    }

    pub fn with_body(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyKind {
    Anon,
    Service,
}

pub(crate) fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Resolve the project API key on the request, or reject with 401.
pub(crate) fn api_key(headers: &HeaderMap) -> Result<KeyKind, Failure> {
    match bearer(headers) {
        Some(ANON_KEY) => Ok(KeyKind::Anon),
        Some(SERVICE_KEY) => Ok(KeyKind::Service),
        Some(_) => Err(Failure::new(StatusCode::UNAUTHORIZED, "Invalid API key")),
        None => Err(Failure::new(StatusCode::UNAUTHORIZED, "Missing API key")),
    }
}

pub fn app() -> Router {
    app_with(MockConfig::default())
}

pub fn app_with(config: MockConfig) -> Router {
    let db: Db = Arc::new(RwLock::new(Backend {
        quota_bytes: config.quota_bytes,
        ..Backend::default()
    }));

    Router::new()
        .route(
            "/api/v1/db/{table}",
            get(db::query_rows)
                .post(db::insert_row)
                .patch(db::update_rows)
                .delete(db::delete_rows),
        )
        .route(
            "/api/v1/db/{table}/{id}",
            get(db::get_row).patch(db::update_row).delete(db::delete_row),
        )
        .route(
            "/api/v2/schema/tables",
            get(schema::list_tables).post(schema::create_table),
        )
        .route(
            "/api/v2/schema/tables/{name}",
            get(schema::table_schema)
                .patch(schema::alter_table)
                .delete(schema::drop_table),
        )
        .route("/api/v2/schema/execute", post(schema::execute_sql))
        .route("/api/v1/storage/quota", get(storage::quota))
        .route("/api/v1/storage/upload", post(storage::upload))
        .route("/api/v1/storage/download", get(storage::download))
        .route("/api/v1/storage/list", get(storage::list))
        .route("/api/v1/storage/info", get(storage::info))
        .route("/api/v1/storage/delete", delete(storage::delete_one))
        .route(
            "/api/v1/storage/delete-batch",
            delete(storage::delete_batch),
        )
        .route("/api/auth/signup", post(auth::sign_up))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/oauth/{provider}", get(auth::oauth_authorize))
        .route("/api/auth/oauth/{provider}/callback", post(auth::oauth_callback))
        .route("/api/auth/otp/send", post(auth::otp_send))
        .route("/api/auth/otp/verify", post(auth::otp_verify))
        .route("/api/auth/forgot-password", post(auth::forgot_password))
        .route("/api/auth/reset-password", post(auth::reset_password))
        .route("/api/auth/magic-link/send", post(auth::magic_link))
        .route("/api/auth/verify-email", post(auth::verify_email))
        .route("/api/auth/resend-verification", post(auth::resend_verification))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with(listener, MockConfig::default()).await
}

pub async fn run_with(listener: TcpListener, config: MockConfig) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(config)).await
}
