//! DTOs exchanged with the WowSQL API.
//!
//! # Design
//! Rows are schemaless (`Record`), so database payloads stay as JSON maps and
//! callers decode into their own types when they want to. Storage, auth and
//! schema payloads have fixed shapes and get concrete structs. Optional
//! response fields default rather than fail so minor server additions or
//! omissions do not surface as parse errors.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// One row: column name to JSON value.
pub type Record = serde_json::Map<String, Value>;

/// Rows returned by a query plus the server-reported total.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub data: Vec<Record>,
    pub count: u64,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode every row into `T`.
    pub fn decode_rows<T: DeserializeOwned>(&self) -> Result<Vec<T>, ApiError> {
        self.data
            .iter()
            .map(|row| serde_json::from_value(Value::Object(row.clone())).map_err(ApiError::Parse))
            .collect()
    }
}

/// Outcome of a write.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationResult {
    /// Identifier of the newly created record.
    Inserted { id: Value },
    /// Number of rows touched by an update or delete.
    Affected { rows: u64 },
}

impl MutationResult {
    pub fn id(&self) -> Option<&Value> {
        match self {
            MutationResult::Inserted { id } => Some(id),
            MutationResult::Affected { .. } => None,
        }
    }

    pub fn affected_rows(&self) -> u64 {
        match self {
            MutationResult::Inserted { .. } => 1,
            MutationResult::Affected { rows } => *rows,
        }
    }
}

/// Primary key value as it appears in a record URL.
///
/// JSON strings contribute their contents, not their quoted form, so the id
/// returned by an insert can be passed straight back to `get_by_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordId(String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Value> for RecordId {
    fn from(value: &Value) -> Self {
        match value {
            Value::String(s) => RecordId(s.clone()),
            other => RecordId(other.to_string()),
        }
    }
}

impl From<Value> for RecordId {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => RecordId(s),
            other => RecordId(other.to_string()),
        }
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        RecordId(value)
    }
}

impl From<&String> for RecordId {
    fn from(value: &String) -> Self {
        RecordId(value.clone())
    }
}

macro_rules! record_id_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for RecordId {
            fn from(value: $t) -> Self {
                RecordId(value.to_string())
            }
        })*
    };
}

record_id_from_int!(i32, i64, u32, u64, usize);

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageQuota {
    #[serde(rename = "storage_used_bytes")]
    pub used_bytes: u64,
    #[serde(rename = "storage_quota_bytes")]
    pub quota_bytes: u64,
}

impl StorageQuota {
    pub fn available_bytes(&self) -> u64 {
        self.quota_bytes.saturating_sub(self.used_bytes)
    }

    pub fn usage_percentage(&self) -> f64 {
        if self.quota_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.quota_bytes as f64 * 100.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageFile {
    pub key: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileUploadResult {
    pub key: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PresignedOperation {
    Get,
    Put,
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub user_metadata: Record,
    #[serde(default)]
    pub app_metadata: Record,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Tokens issued by the auth service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: String,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: u64,
}

impl Session {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_empty() && self.refresh_token.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthResult {
    pub user: Option<AuthUser>,
    pub session: Session,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuthAuthorizeResponse {
    pub authorization_url: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_callback_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_redirect_uri: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Login,
    Signup,
    PasswordReset,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MagicLinkPurpose {
    Login,
    Signup,
    EmailVerification,
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_increment: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            ..Self::default()
        }
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = Some(true);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = Some(true);
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateTableRequest {
    pub table_name: String,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlterOperation {
    AddColumn,
    DropColumn,
    ModifyColumn,
    RenameColumn,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlterTableRequest {
    pub table_name: String,
    pub operation: AlterOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_column_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl AlterTableRequest {
    pub fn new(table_name: impl Into<String>, operation: AlterOperation) -> Self {
        Self {
            table_name: table_name.into(),
            operation,
            column_name: None,
            column_type: None,
            new_column_name: None,
            nullable: None,
            default: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default)]
    pub rows_affected: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Column layout of one table as reported by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_id_drops_json_quotes() {
        assert_eq!(RecordId::from(&json!("abc-123")).as_str(), "abc-123");
        assert_eq!(RecordId::from(json!(42)).as_str(), "42");
        assert_eq!(RecordId::from(7u64).to_string(), "7");
        assert_eq!(RecordId::from("k1"), RecordId::from(String::from("k1")));
    }

    #[test]
    fn quota_derived_fields() {
        let quota = StorageQuota {
            used_bytes: 250,
            quota_bytes: 1000,
        };
        assert_eq!(quota.available_bytes(), 750);
        assert!((quota.usage_percentage() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn quota_over_limit_saturates() {
        let quota = StorageQuota {
            used_bytes: 1200,
            quota_bytes: 1000,
        };
        assert_eq!(quota.available_bytes(), 0);
        let empty = StorageQuota {
            used_bytes: 0,
            quota_bytes: 0,
        };
        assert_eq!(empty.usage_percentage(), 0.0);
    }

    #[test]
    fn quota_ignores_extra_server_fields() {
        let quota: StorageQuota = serde_json::from_str(
            r#"{"storage_used_bytes":1,"storage_quota_bytes":3,"storage_available_bytes":2,"usage_percentage":33.3}"#,
        )
        .unwrap();
        assert_eq!(quota.available_bytes(), 2);
    }

    #[test]
    fn column_definition_omits_unset_flags() {
        let column = ColumnDefinition::new("email", "VARCHAR(255)").unique().nullable(false);
        let json = serde_json::to_value(&column).unwrap();
        assert_eq!(json["type"], "VARCHAR(255)");
        assert_eq!(json["unique"], true);
        assert_eq!(json["nullable"], false);
        assert!(json.get("auto_increment").is_none());
        assert!(json.get("default").is_none());
    }

    #[test]
    fn alter_operation_wire_names() {
        let req = AlterTableRequest::new("users", AlterOperation::RenameColumn);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["operation"], "rename_column");
        assert_eq!(
            serde_json::to_value(OtpPurpose::PasswordReset).unwrap(),
            "password_reset"
        );
    }

    #[test]
    fn decode_rows_into_struct() {
        #[derive(Deserialize)]
        struct User {
            name: String,
        }
        let mut row = Record::new();
        row.insert("name".to_string(), Value::from("X"));
        let result = QueryResult {
            data: vec![row],
            count: 1,
        };
        let users: Vec<User> = result.decode_rows().unwrap();
        assert_eq!(users[0].name, "X");
    }

    #[test]
    fn mutation_result_accessors() {
        let inserted = MutationResult::Inserted { id: Value::from(7) };
        assert_eq!(inserted.id(), Some(&Value::from(7)));
        let affected = MutationResult::Affected { rows: 3 };
        assert_eq!(affected.id(), None);
        assert_eq!(affected.affected_rows(), 3);
    }
}
