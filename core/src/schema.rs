//! Table DDL and raw SQL. Every endpoint here requires a service role key.

use std::sync::Arc;

use serde_json::json;

use crate::config::{ClientConfig, DEFAULT_TIMEOUT};
use crate::dispatch::Dispatcher;
use crate::error::ApiError;
use crate::http::{path_segment, HttpMethod, HttpRequest, HttpResponse};
use crate::response::decode;
use crate::transport::{Transport, UreqTransport};
use crate::types::{AlterTableRequest, CreateTableRequest, SchemaResponse};

const TABLES: &str = "/api/v2/schema/tables";
const EXECUTE: &str = "/api/v2/schema/execute";

pub const SERVICE_KEY_REQUIRED: &str =
    "schema operations require a service role key; anonymous keys cannot modify the database schema";

#[derive(Debug, Clone)]
pub struct SchemaClient {
    dispatcher: Dispatcher,
}

impl SchemaClient {
    /// `config.api_key` must be a service role key.
    pub fn new(config: &ClientConfig) -> Self {
        let transport = Arc::new(UreqTransport::new(config.timeout_or(DEFAULT_TIMEOUT)));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            dispatcher: Dispatcher::new(&config.base_url(), &config.api_key, transport),
        }
    }

    pub fn build_create_table(&self, request: &CreateTableRequest) -> Result<HttpRequest, ApiError> {
        self.dispatcher.json(HttpMethod::Post, TABLES, request)
    }

    pub fn build_alter_table(&self, request: &AlterTableRequest) -> Result<HttpRequest, ApiError> {
        self.dispatcher.json(
            HttpMethod::Patch,
            &format!("{TABLES}/{}", path_segment(&request.table_name)),
            request,
        )
    }

    pub fn build_drop_table(&self, table: &str, cascade: bool) -> HttpRequest {
        self.dispatcher
            .request(HttpMethod::Delete, &format!("{TABLES}/{}", path_segment(table)))
            .with_query("cascade", cascade.to_string())
    }

    pub fn build_execute_sql(&self, sql: &str) -> Result<HttpRequest, ApiError> {
        self.dispatcher
            .json(HttpMethod::Post, EXECUTE, &json!({ "sql": sql }))
    }

    /// Decode a schema response; a 403 becomes a `Permission` error naming
    /// the service role key.
    pub fn parse_schema_response(&self, response: &HttpResponse) -> Result<SchemaResponse, ApiError> {
        if response.status == 403 {
            tracing::warn!("schema operation rejected: service role key required");
            return Err(ApiError::Permission {
                message: SERVICE_KEY_REQUIRED.to_string(),
            });
        }
        decode(response)
    }

    pub fn create_table(&self, request: &CreateTableRequest) -> Result<SchemaResponse, ApiError> {
        let response = self.dispatcher.send(self.build_create_table(request)?)?;
        self.parse_schema_response(&response)
    }

    pub fn alter_table(&self, request: &AlterTableRequest) -> Result<SchemaResponse, ApiError> {
        let response = self.dispatcher.send(self.build_alter_table(request)?)?;
        self.parse_schema_response(&response)
    }

    /// Drop `table`. This cannot be undone.
    pub fn drop_table(&self, table: &str, cascade: bool) -> Result<SchemaResponse, ApiError> {
        let response = self.dispatcher.send(self.build_drop_table(table, cascade))?;
        self.parse_schema_response(&response)
    }

    pub fn execute_sql(&self, sql: &str) -> Result<SchemaResponse, ApiError> {
        let response = self.dispatcher.send(self.build_execute_sql(sql)?)?;
        self.parse_schema_response(&response)
    }
}
