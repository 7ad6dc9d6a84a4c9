use std::{cmp::Ordering, collections::HashMap};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::{api_key, Db, Failure, Row, TableData};

type Params = Query<Vec<(String, String)>>;

const NULL: &Value = &Value::Null;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Is,
}

#[derive(Debug)]
struct Predicate {
    column: String,
    op: Op,
    literal: String,
}

fn parse_predicate(raw: &str) -> Result<Predicate, Failure> {
    let mut parts = raw.splitn(3, '.');
    let (Some(column), Some(op), Some(literal)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(Failure::bad_request(format!("malformed filter '{raw}'")));
    };
    let op = match op {
        "eq" => Op::Eq,
        "neq" => Op::Neq,
        "gt" => Op::Gt,
        "gte" => Op::Gte,
        "lt" => Op::Lt,
        "lte" => Op::Lte,
        "like" => Op::Like,
        "is" => Op::Is,
        other => return Err(Failure::bad_request(format!("unknown operator '{other}'"))),
    };
    Ok(Predicate {
        column: column.to_string(),
        op,
        literal: literal.to_string(),
    })
}

fn predicates(params: &[(String, String)]) -> Result<Vec<Predicate>, Failure> {
    params
        .iter()
        .filter(|(k, _)| k == "filter")
        .map(|(_, v)| parse_predicate(v))
        .collect()
}

/// SQL LIKE with `%` and `_`.
fn like(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => (0..=text.len()).any(|i| like(rest, &text[i..])),
        Some(('_', rest)) => !text.is_empty() && like(rest, &text[1..]),
        Some((c, rest)) => text.first() == Some(c) && like(rest, &text[1..]),
    }
}

fn compare_literal(value: &Value, literal: &str) -> Option<Ordering> {
    match value {
        Value::Number(n) => n.as_f64()?.partial_cmp(&literal.parse::<f64>().ok()?),
        Value::String(s) => Some(s.as_str().cmp(literal)),
        Value::Bool(b) => literal.parse::<bool>().ok().map(|l| b.cmp(&l)),
        _ => None,
    }
}

impl Predicate {
    fn matches(&self, row: &Row) -> bool {
        let value = row.get(&self.column).unwrap_or(NULL);
        if value.is_null() || self.op == Op::Is {
            let wants_null = self.literal == "null";
            return match self.op {
                Op::Is | Op::Eq => value.is_null() == wants_null,
                Op::Neq => value.is_null() != wants_null,
                _ => false,
            };
        }
        if self.op == Op::Like {
            let Value::String(text) = value else {
                return false;
            };
            let pattern: Vec<char> = self.literal.chars().collect();
            let text: Vec<char> = text.chars().collect();
            return like(&pattern, &text);
        }
        let Some(ordering) = compare_literal(value, &self.literal) else {
            return false;
        };
        match self.op {
            Op::Eq => ordering == Ordering::Equal,
            Op::Neq => ordering != Ordering::Equal,
            Op::Gt => ordering == Ordering::Greater,
            Op::Gte => ordering != Ordering::Less,
            Op::Lt => ordering == Ordering::Less,
            Op::Lte => ordering != Ordering::Greater,
            Op::Like | Op::Is => false,
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn id_matches(row: &Row, id: &str) -> bool {
    match row.get("id") {
        Some(Value::String(s)) => s == id,
        Some(other) => other.to_string() == id,
        None => false,
    }
}

fn table<'a>(tables: &'a HashMap<String, TableData>, name: &str) -> Result<&'a TableData, Failure> {
    tables
        .get(name)
        .ok_or_else(|| Failure::not_found(format!("Table '{name}' not found")))
}

fn table_mut<'a>(
    tables: &'a mut HashMap<String, TableData>,
    name: &str,
) -> Result<&'a mut TableData, Failure> {
    tables
        .get_mut(name)
        .ok_or_else(|| Failure::not_found(format!("Table '{name}' not found")))
}

fn first_param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn parse_count(params: &[(String, String)], key: &str) -> Result<Option<usize>, Failure> {
    first_param(params, key)
        .map(|raw| {
            raw.parse::<usize>()
                .map_err(|_| Failure::bad_request(format!("invalid {key} '{raw}'")))
        })
        .transpose()
}

pub async fn query_rows(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(params): Params,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    let filters = predicates(&params)?;
    let limit = parse_count(&params, "limit")?;
    let offset = parse_count(&params, "offset")?.unwrap_or(0);

    let backend = db.read().await;
    let data = table(&backend.tables, &name)?;
    let mut rows: Vec<&Row> = data
        .rows
        .iter()
        .filter(|row| filters.iter().all(|f| f.matches(row)))
        .collect();
    let count = rows.len();

    if let Some(order) = first_param(&params, "order") {
        let (column, descending) = match order.rsplit_once('.') {
            Some((column, "desc")) => (column, true),
            Some((column, "asc")) => (column, false),
            _ => (order, false),
        };
        rows.sort_by(|a, b| {
            let ordering = compare_values(
                a.get(column).unwrap_or(NULL),
                b.get(column).unwrap_or(NULL),
            );
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }

    let columns: Option<Vec<&str>> = first_param(&params, "select")
        .filter(|s| *s != "*")
        .map(|s| s.split(',').map(str::trim).collect());

    let page: Vec<Value> = rows
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .map(|row| match &columns {
            Some(columns) => Value::Object(
                row.iter()
                    .filter(|(k, _)| columns.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            None => Value::Object(row.clone()),
        })
        .collect();

    Ok(Json(json!({ "data": page, "count": count })))
}

pub async fn get_row(
    State(db): State<Db>,
    headers: HeaderMap,
    Path((name, id)): Path<(String, String)>,
) -> Result<Json<Row>, Failure> {
    api_key(&headers)?;
    let backend = db.read().await;
    table(&backend.tables, &name)?
        .rows
        .iter()
        .find(|row| id_matches(row, &id))
        .cloned()
        .map(Json)
        .ok_or_else(|| Failure::not_found(format!("Record '{id}' not found in '{name}'")))
}

pub async fn insert_row(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(mut row): Json<Row>,
) -> Result<impl IntoResponse, Failure> {
    api_key(&headers)?;
    let mut backend = db.write().await;
    let data = table_mut(&mut backend.tables, &name)?;
    let id = match row.get("id") {
        Some(id) if !id.is_null() => id.clone(),
        _ => {
            data.next_id += 1;
            let id = Value::from(data.next_id);
            row.insert("id".to_string(), id.clone());
            id
        }
    };
    data.rows.push(row);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": id, "message": "Record created" })),
    ))
}

fn merge(row: &mut Row, changes: &Row) {
    for (key, value) in changes {
        if key != "id" {
            row.insert(key.clone(), value.clone());
        }
    }
}

pub async fn update_rows(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(params): Params,
    Json(changes): Json<Row>,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    let filters = predicates(&params)?;
    let mut backend = db.write().await;
    let data = table_mut(&mut backend.tables, &name)?;
    let mut affected = 0u64;
    for row in data.rows.iter_mut() {
        if filters.iter().all(|f| f.matches(row)) {
            merge(row, &changes);
            affected += 1;
        }
    }
    Ok(Json(json!({ "affected_rows": affected })))
}

pub async fn update_row(
    State(db): State<Db>,
    headers: HeaderMap,
    Path((name, id)): Path<(String, String)>,
    Json(changes): Json<Row>,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    let mut backend = db.write().await;
    let data = table_mut(&mut backend.tables, &name)?;
    let row = data
        .rows
        .iter_mut()
        .find(|row| id_matches(row, &id))
        .ok_or_else(|| Failure::not_found(format!("Record '{id}' not found in '{name}'")))?;
    merge(row, &changes);
    Ok(Json(json!({ "affected_rows": 1 })))
}

pub async fn delete_rows(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(params): Params,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    let filters = predicates(&params)?;
    let mut backend = db.write().await;
    let data = table_mut(&mut backend.tables, &name)?;
    let before = data.rows.len();
    data.rows.retain(|row| !filters.iter().all(|f| f.matches(row)));
    Ok(Json(json!({ "affected_rows": before - data.rows.len() })))
}

pub async fn delete_row(
    State(db): State<Db>,
    headers: HeaderMap,
    Path((name, id)): Path<(String, String)>,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    let mut backend = db.write().await;
    let data = table_mut(&mut backend.tables, &name)?;
    let before = data.rows.len();
    data.rows.retain(|row| !id_matches(row, &id));
    if data.rows.len() == before {
        return Err(Failure::not_found(format!("Record '{id}' not found in '{name}'")));
    }
    Ok(Json(json!({ "affected_rows": 1 })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn like_wildcards() {
        let matches = |p: &str, t: &str| {
            like(
                &p.chars().collect::<Vec<_>>(),
                &t.chars().collect::<Vec<_>>(),
            )
        };
        assert!(matches("%@z.com", "y@z.com"));
        assert!(matches("J_n%", "Jane"));
        assert!(!matches("J_n%", "Jon"));
        assert!(matches("%", ""));
    }

    #[test]
    fn predicates_compare_by_value_type() {
        let r = row(json!({"age": 21, "name": "Ann", "deleted_at": null}));
        assert!(parse_predicate("age.gte.18").unwrap().matches(&r));
        assert!(!parse_predicate("age.lt.18").unwrap().matches(&r));
        assert!(parse_predicate("name.eq.Ann").unwrap().matches(&r));
        assert!(parse_predicate("deleted_at.is.null").unwrap().matches(&r));
        assert!(!parse_predicate("name.is.null").unwrap().matches(&r));
        assert!(parse_predicate("email.is.null").unwrap().matches(&r));
    }

    #[test]
    fn literal_may_contain_dots() {
        let p = parse_predicate("email.eq.y@z.com").unwrap();
        assert_eq!(p.column, "email");
        assert_eq!(p.literal, "y@z.com");
    }

    #[test]
    fn malformed_filters_rejected() {
        assert!(parse_predicate("age").is_err());
        assert!(parse_predicate("age.between.1").is_err());
    }
}
