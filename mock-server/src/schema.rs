use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{api_key, Db, Failure, KeyKind, TableData};

#[derive(Debug, Deserialize)]
pub struct CreateTable {
    table_name: String,
    columns: Vec<Value>,
    #[serde(default)]
    primary_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AlterTable {
    operation: String,
    #[serde(default)]
    column_name: Option<String>,
    #[serde(default)]
    column_type: Option<String>,
    #[serde(default)]
    new_column_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DropParams {
    #[serde(default)]
    cascade: bool,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteSql {
    sql: String,
}

fn require_service(headers: &HeaderMap) -> Result<(), Failure> {
    match api_key(headers)? {
        KeyKind::Service => Ok(()),
        KeyKind::Anon => Err(Failure::new(
            StatusCode::FORBIDDEN,
            "Schema operations require a service role key",
        )),
    }
}

fn column_name(column: &Value) -> Option<&str> {
    column.get("name").and_then(Value::as_str)
}

fn success(table: &str, operation: &str, message: String) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": message,
        "table": table,
        "operation": operation,
    }))
}

pub async fn list_tables(
    State(db): State<Db>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    let backend = db.read().await;
    let mut tables: Vec<&String> = backend.tables.keys().collect();
    tables.sort();
    Ok(Json(json!({ "tables": tables })))
}

pub async fn table_schema(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    let backend = db.read().await;
    let data = backend
        .tables
        .get(&name)
        .ok_or_else(|| Failure::not_found(format!("Table '{name}' not found")))?;
    Ok(Json(json!({
        "table": name,
        "columns": data.columns,
        "primary_key": data.primary_key,
    })))
}

pub async fn create_table(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(body): Json<CreateTable>,
) -> Result<impl IntoResponse, Failure> {
    require_service(&headers)?;
    if body.columns.is_empty() {
        return Err(Failure::bad_request("a table needs at least one column"));
    }
    let mut backend = db.write().await;
    if backend.tables.contains_key(&body.table_name) {
        return Err(Failure::bad_request(format!(
            "Table '{}' already exists",
            body.table_name
        )));
    }
    backend.tables.insert(
        body.table_name.clone(),
        TableData {
            columns: body.columns,
            primary_key: body.primary_key,
            ..TableData::default()
        },
    );
    tracing::info!(table = %body.table_name, "table created");
    let message = format!("Table '{}' created", body.table_name);
    Ok((
        StatusCode::CREATED,
        success(&body.table_name, "create", message),
    ))
}

pub async fn alter_table(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<AlterTable>,
) -> Result<Json<Value>, Failure> {
    require_service(&headers)?;
    let mut backend = db.write().await;
    let data = backend
        .tables
        .get_mut(&name)
        .ok_or_else(|| Failure::not_found(format!("Table '{name}' not found")))?;
    let column = body
        .column_name
        .as_deref()
        .ok_or_else(|| Failure::bad_request("column_name is required"))?;
    let position = data.columns.iter().position(|c| column_name(c) == Some(column));

    match (body.operation.as_str(), position) {
        ("add_column", None) => {
            let data_type = body.column_type.as_deref().unwrap_or("TEXT");
            data.columns.push(json!({ "name": column, "type": data_type }));
        }
        ("add_column", Some(_)) => {
            return Err(Failure::bad_request(format!("Column '{column}' already exists")));
        }
        ("drop_column", Some(index)) => {
            data.columns.remove(index);
            for row in data.rows.iter_mut() {
                row.remove(column);
            }
        }
        ("modify_column", Some(index)) => {
            if let Some(data_type) = body.column_type.as_deref() {
                data.columns[index]["type"] = Value::from(data_type);
            }
        }
        ("rename_column", Some(index)) => {
            let new_name = body
                .new_column_name
                .as_deref()
                .ok_or_else(|| Failure::bad_request("new_column_name is required"))?;
            data.columns[index]["name"] = Value::from(new_name);
            for row in data.rows.iter_mut() {
                if let Some(value) = row.remove(column) {
                    row.insert(new_name.to_string(), value);
                }
            }
        }
        ("drop_column" | "modify_column" | "rename_column", None) => {
            return Err(Failure::not_found(format!("Column '{column}' not found")));
        }
        (other, _) => {
            return Err(Failure::bad_request(format!("unknown operation '{other}'")));
        }
    }
    let message = format!("Table '{name}' altered");
    Ok(success(&name, &body.operation, message))
}

pub async fn drop_table(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(params): Query<DropParams>,
) -> Result<Json<Value>, Failure> {
    require_service(&headers)?;
    let mut backend = db.write().await;
    if backend.tables.remove(&name).is_none() {
        return Err(Failure::not_found(format!("Table '{name}' not found")));
    }
    tracing::info!(table = %name, cascade = params.cascade, "table dropped");
    let message = format!("Table '{name}' dropped");
    Ok(success(&name, "drop", message))
}

/// Accepts any non-empty statement. Nothing is executed.
pub async fn execute_sql(
    headers: HeaderMap,
    Json(body): Json<ExecuteSql>,
) -> Result<Json<Value>, Failure> {
    require_service(&headers)?;
    if body.sql.trim().is_empty() {
        return Err(Failure::bad_request("sql must not be empty"));
    }
    Ok(Json(json!({
        "success": true,
        "message": "SQL executed",
        "rows_affected": 0,
    })))
}
