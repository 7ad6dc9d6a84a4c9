//! Database access: the project-level `WowsqlClient` and the fluent `Table`
//! query builder.
//!
//! # Design
//! `Table` owns its `Query` and every builder method consumes and returns it,
//! so chains accumulate state without I/O. Terminal methods borrow the
//! builder and perform one round trip each. As with the other clients, each
//! round trip is split into a public `build_*` method producing the
//! `HttpRequest` and a `parse_*` method consuming the `HttpResponse`.
//!
//! `update` and `delete` send whatever predicates were accumulated. With no
//! predicates they affect every row of the table; this is not guarded.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::AuthClient;
use crate::config::{ClientConfig, DEFAULT_TIMEOUT};
use crate::dispatch::Dispatcher;
use crate::error::ApiError;
use crate::http::{path_segment, HttpMethod, HttpRequest, HttpResponse};
use crate::query::{Filter, FilterOp, Query, SortDirection};
use crate::response::decode;
use crate::schema::SchemaClient;
use crate::storage::StorageClient;
use crate::transport::{Transport, UreqTransport};
use crate::types::{MutationResult, QueryResult, Record, RecordId, TableSchema};

const DB_PREFIX: &str = "/api/v1/db";
const SCHEMA_TABLES: &str = "/api/v2/schema/tables";

/// Entry point for a project. Hands out `Table` builders and the other
/// domain clients, all sharing one configuration.
#[derive(Clone)]
pub struct WowsqlClient {
    config: ClientConfig,
    dispatcher: Dispatcher,
    /// Caller-supplied transport, handed on to every derived client. `None`
    /// means each client builds its own `ureq` agent with its own timeout.
    injected: Option<Arc<dyn Transport>>,
}

impl fmt::Debug for WowsqlClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WowsqlClient")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .field("injected_transport", &self.injected.is_some())
            .finish()
    }
}

impl WowsqlClient {
    pub fn new(config: ClientConfig) -> Self {
        let transport = Arc::new(UreqTransport::new(config.timeout_or(DEFAULT_TIMEOUT)));
        let dispatcher = Dispatcher::new(&config.base_url(), &config.api_key, transport);
        Self {
            config,
            dispatcher,
            injected: None,
        }
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let dispatcher = Dispatcher::new(&config.base_url(), &config.api_key, transport.clone());
        Self {
            config,
            dispatcher,
            injected: Some(transport),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start a query against `name`.
    pub fn table(&self, name: impl Into<String>) -> Table {
        Table {
            dispatcher: self.dispatcher.clone(),
            query: Query::new(name),
        }
    }

    pub fn storage(&self) -> StorageClient {
        match &self.injected {
            Some(transport) => StorageClient::with_transport(&self.config, transport.clone()),
            None => StorageClient::new(&self.config),
        }
    }

    pub fn auth(&self) -> AuthClient {
        match &self.injected {
            Some(transport) => AuthClient::with_transport(&self.config, transport.clone()),
            None => AuthClient::new(&self.config),
        }
    }

    /// Schema management requires a service role key; pass one here when
    /// this client was built with an anonymous key.
    pub fn schema(&self, service_key: Option<&str>) -> SchemaClient {
        let config = match service_key {
            Some(key) => self.config.clone().with_api_key(key),
            None => self.config.clone(),
        };
        match &self.injected {
            Some(transport) => SchemaClient::with_transport(&config, transport.clone()),
            None => SchemaClient::new(&config),
        }
    }

    pub fn build_list_tables(&self) -> HttpRequest {
        self.dispatcher.request(HttpMethod::Get, SCHEMA_TABLES)
    }

    pub fn parse_list_tables(&self, response: &HttpResponse) -> Result<Vec<String>, ApiError> {
        #[derive(Deserialize)]
        struct Tables {
            tables: Vec<String>,
        }
        decode::<Tables>(response).map(|t| t.tables)
    }

    pub fn list_tables(&self) -> Result<Vec<String>, ApiError> {
        let response = self.dispatcher.send(self.build_list_tables())?;
        self.parse_list_tables(&response)
    }

    pub fn build_table_schema(&self, name: &str) -> HttpRequest {
        self.dispatcher
            .request(HttpMethod::Get, &format!("{SCHEMA_TABLES}/{}", path_segment(name)))
    }

    pub fn parse_table_schema(&self, response: &HttpResponse) -> Result<TableSchema, ApiError> {
        decode(response)
    }

    pub fn table_schema(&self, name: &str) -> Result<TableSchema, ApiError> {
        let response = self.dispatcher.send(self.build_table_schema(name))?;
        self.parse_table_schema(&response)
    }
}

/// Fluent query builder bound to one table.
#[derive(Debug, Clone)]
#[must_use = "builder methods return a new Table; call a terminal method to run it"]
pub struct Table {
    dispatcher: Dispatcher,
    query: Query,
}

#[derive(Deserialize)]
struct QueryWire {
    #[serde(default)]
    data: Vec<Record>,
    #[serde(default)]
    count: Option<u64>,
}

#[derive(Deserialize)]
struct InsertWire {
    id: Value,
}

#[derive(Deserialize)]
struct AffectedWire {
    #[serde(default)]
    affected_rows: u64,
}

impl Table {
    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn name(&self) -> &str {
        &self.query.table
    }

    // -- accumulation -------------------------------------------------------

    /// Replace the projection. An empty list selects every column.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.set_columns(columns);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.query.push_filter(filter);
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::new(column, FilterOp::Eq, value))
    }

    pub fn neq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::new(column, FilterOp::Neq, value))
    }

    pub fn gt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::new(column, FilterOp::Gt, value))
    }

    pub fn gte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::new(column, FilterOp::Gte, value))
    }

    pub fn lt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::new(column, FilterOp::Lt, value))
    }

    pub fn lte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::new(column, FilterOp::Lte, value))
    }

    /// SQL `LIKE` pattern (`%` and `_` wildcards).
    pub fn like(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        let pattern: String = pattern.into();
        self.filter(Filter::new(column, FilterOp::Like, pattern))
    }

    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.filter(Filter::is_null(column))
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.query.set_order(column, direction);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.query.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.query.offset = Some(n);
        self
    }

    // -- request building ---------------------------------------------------

    fn table_path(&self) -> String {
        format!("{DB_PREFIX}/{}", path_segment(&self.query.table))
    }

    fn record_path(&self, id: &RecordId) -> String {
        format!("{}/{}", self.table_path(), path_segment(id.as_str()))
    }

    pub fn build_select(&self) -> HttpRequest {
        self.dispatcher
            .request(HttpMethod::Get, &self.table_path())
            .with_query_pairs(self.query.to_params())
    }

    pub fn build_get_by_id(&self, id: impl Into<RecordId>) -> HttpRequest {
        self.dispatcher
            .request(HttpMethod::Get, &self.record_path(&id.into()))
    }

    pub fn build_insert<T: Serialize + ?Sized>(&self, record: &T) -> Result<HttpRequest, ApiError> {
        self.dispatcher
            .json(HttpMethod::Post, &self.table_path(), record)
    }

    pub fn build_update<T: Serialize + ?Sized>(&self, record: &T) -> Result<HttpRequest, ApiError> {
        Ok(self
            .dispatcher
            .json(HttpMethod::Patch, &self.table_path(), record)?
            .with_query_pairs(self.query.filter_params()))
    }

    pub fn build_update_by_id<T: Serialize + ?Sized>(
        &self,
        id: impl Into<RecordId>,
        record: &T,
    ) -> Result<HttpRequest, ApiError> {
        self.dispatcher
            .json(HttpMethod::Patch, &self.record_path(&id.into()), record)
    }

    pub fn build_delete(&self) -> HttpRequest {
        self.dispatcher
            .request(HttpMethod::Delete, &self.table_path())
            .with_query_pairs(self.query.filter_params())
    }

    pub fn build_delete_by_id(&self, id: impl Into<RecordId>) -> HttpRequest {
        self.dispatcher
            .request(HttpMethod::Delete, &self.record_path(&id.into()))
    }

    // -- response parsing ---------------------------------------------------

    pub fn parse_select(&self, response: &HttpResponse) -> Result<QueryResult, ApiError> {
        let wire: QueryWire = decode(response)?;
        let count = wire.count.unwrap_or(wire.data.len() as u64);
        Ok(QueryResult {
            data: wire.data,
            count,
        })
    }

    /// Like `parse_select`, but the server must report the total.
    pub fn parse_count(&self, response: &HttpResponse) -> Result<u64, ApiError> {
        let wire: QueryWire = decode(response)?;
        wire.count.ok_or_else(|| {
            ApiError::Parse(<serde_json::Error as serde::de::Error>::missing_field("count"))
        })
    }

    pub fn parse_get_by_id(&self, response: &HttpResponse) -> Result<Record, ApiError> {
        decode(response)
    }

    pub fn parse_insert(&self, response: &HttpResponse) -> Result<MutationResult, ApiError> {
        let wire: InsertWire = decode(response)?;
        Ok(MutationResult::Inserted { id: wire.id })
    }

    /// Parse the response of any update or delete.
    pub fn parse_affected(&self, response: &HttpResponse) -> Result<MutationResult, ApiError> {
        let wire: AffectedWire = decode(response)?;
        Ok(MutationResult::Affected {
            rows: wire.affected_rows,
        })
    }

    // -- terminal operations ------------------------------------------------

    pub fn execute(&self) -> Result<QueryResult, ApiError> {
        let response = self.dispatcher.send(self.build_select())?;
        self.parse_select(&response)
    }

    /// First matching row, or `None` when nothing matches.
    pub fn first(&self) -> Result<Option<Record>, ApiError> {
        let single = self.clone().limit(1);
        Ok(single.execute()?.data.into_iter().next())
    }

    /// Number of rows matching the accumulated predicates.
    pub fn count(&self) -> Result<u64, ApiError> {
        let request = self.clone().limit(1).build_select();
        let response = self.dispatcher.send(request)?;
        self.parse_count(&response)
    }

    pub fn get_by_id(&self, id: impl Into<RecordId>) -> Result<Record, ApiError> {
        let response = self.dispatcher.send(self.build_get_by_id(id))?;
        self.parse_get_by_id(&response)
    }

    pub fn insert<T: Serialize + ?Sized>(&self, record: &T) -> Result<MutationResult, ApiError> {
        let response = self.dispatcher.send(self.build_insert(record)?)?;
        self.parse_insert(&response)
    }

    /// Apply `record` to every row matching the accumulated predicates.
    pub fn update<T: Serialize + ?Sized>(&self, record: &T) -> Result<MutationResult, ApiError> {
        let response = self.dispatcher.send(self.build_update(record)?)?;
        self.parse_affected(&response)
    }

    /// Update the single row with primary key `id`, ignoring accumulated
    /// predicates.
    pub fn update_by_id<T: Serialize + ?Sized>(
        &self,
        id: impl Into<RecordId>,
        record: &T,
    ) -> Result<MutationResult, ApiError> {
        let response = self.dispatcher.send(self.build_update_by_id(id, record)?)?;
        self.parse_affected(&response)
    }

    /// Delete every row matching the accumulated predicates.
    pub fn delete(&self) -> Result<MutationResult, ApiError> {
        let response = self.dispatcher.send(self.build_delete())?;
        self.parse_affected(&response)
    }

    /// Delete the single row with primary key `id`, ignoring accumulated
    /// predicates.
    pub fn delete_by_id(&self, id: impl Into<RecordId>) -> Result<MutationResult, ApiError> {
        let response = self.dispatcher.send(self.build_delete_by_id(id))?;
        self.parse_affected(&response)
    }
}
