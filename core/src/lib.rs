//! Blocking client SDK for WowSQL projects: database, storage, auth and
//! schema management over HTTP/JSON.
//!
//! # Overview
//! ```no_run
//! use wowsql_core::{ClientConfig, SortDirection, WowsqlClient};
//!
//! # fn main() -> Result<(), wowsql_core::ApiError> {
//! let client = WowsqlClient::new(ClientConfig::new("acme", "wowsql_anon_..."));
//! let adults = client
//!     .table("users")
//!     .select(["id", "name"])
//!     .gte("age", 18)
//!     .order_by("name", SortDirection::Asc)
//!     .limit(20)
//!     .execute()?;
//! println!("{} of {} rows", adults.data.len(), adults.count);
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//! - Builder calls only accumulate state; each terminal call is exactly one
//!   round trip.
//! - Every round trip is a public `build_*` (produces an `HttpRequest`) and
//!   `parse_*` (consumes an `HttpResponse`) pair around a `Transport`, so the
//!   I/O boundary is explicit and callers may run requests themselves.
//! - The default transport is a blocking `ureq` agent with a per-client
//!   timeout. Nothing is retried.

pub mod auth;
pub mod config;
pub mod database;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod http;
pub mod multipart;
pub mod query;
pub mod response;
pub mod schema;
pub mod storage;
pub mod transport;
pub mod types;

pub use auth::{AuthClient, SignUpOptions};
pub use config::ClientConfig;
pub use database::{Table, WowsqlClient};
pub use dispatch::Dispatcher;
pub use error::ApiError;
pub use format::format_bytes;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use query::{Filter, FilterOp, Query, SortDirection};
pub use schema::SchemaClient;
pub use storage::{StorageClient, UploadOptions};
pub use transport::{Transport, UreqTransport};
pub use types::{
    AlterOperation, AlterTableRequest, AuthResult, AuthUser, ColumnDefinition, CreateTableRequest,
    FileUploadResult, MagicLinkPurpose, MutationResult, OAuthAuthorizeResponse, OtpPurpose,
    PresignedOperation, QueryResult, Record, RecordId, SchemaResponse, Session, StorageFile,
    StorageQuota, TableSchema,
};
