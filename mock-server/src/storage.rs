use axum::{
    extract::{Multipart, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{api_key, Db, Failure, StoredFile};

#[derive(Debug, Deserialize)]
pub struct KeyParams {
    key: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteOne {
    key: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteBatch {
    keys: Vec<String>,
}

fn file_url(key: &str) -> String {
    format!("https://storage.mock.local/{key}")
}

fn describe(key: &str, file: &StoredFile) -> Value {
    json!({
        "key": key,
        "size": file.data.len(),
        "content_type": file.content_type,
        "url": file_url(key),
    })
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> Failure {
    Failure::bad_request(format!("invalid multipart body: {err}"))
}

pub async fn quota(State(db): State<Db>, headers: HeaderMap) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    let backend = db.read().await;
    let used = backend.used_bytes();
    let quota = backend.quota_bytes;
    Ok(Json(json!({
        "storage_used_bytes": used,
        "storage_quota_bytes": quota,
        "storage_available_bytes": quota.saturating_sub(used),
    })))
}

pub async fn upload(
    State(db): State<Db>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, Failure> {
    api_key(&headers)?;
    let mut key = None;
    let mut content_type = None;
    let mut data = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "key" => key = Some(field.text().await.map_err(multipart_error)?),
            "content_type" => content_type = Some(field.text().await.map_err(multipart_error)?),
            "file" => {
                if content_type.is_none() {
                    content_type = field.content_type().map(str::to_string);
                }
                data = Some(field.bytes().await.map_err(multipart_error)?.to_vec());
            }
            _ => {}
        }
    }
    let key = key.ok_or_else(|| Failure::bad_request("missing 'key' field"))?;
    let data = data.ok_or_else(|| Failure::bad_request("missing 'file' field"))?;

    let mut backend = db.write().await;
    let replaced = backend.files.get(&key).map_or(0, |f| f.data.len() as u64);
    let available = backend
        .quota_bytes
        .saturating_sub(backend.used_bytes() - replaced);
    let required = data.len() as u64;
    if required > available {
        tracing::warn!(%key, required, available, "upload rejected: quota exceeded");
        return Err(Failure::with_body(
            StatusCode::PAYLOAD_TOO_LARGE,
            json!({
                "detail": "Storage quota exceeded",
                "required_bytes": required,
                "available_bytes": available,
            }),
        ));
    }

    let file = StoredFile {
        data,
        content_type: content_type.unwrap_or_else(|| "application/octet-stream".to_string()),
    };
    let body = describe(&key, &file);
    backend.files.insert(key, file);
    Ok((StatusCode::CREATED, Json(body)))
}

pub async fn download(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(params): Query<KeyParams>,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    let backend = db.read().await;
    if !backend.files.contains_key(&params.key) {
        return Err(Failure::not_found(format!("File '{}' not found", params.key)));
    }
    let expires_in = params.expires_in.unwrap_or(3600);
    Ok(Json(json!({
        "url": format!("{}?expires_in={expires_in}", file_url(&params.key)),
        "expires_in": expires_in,
    })))
}

pub async fn list(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    let backend = db.read().await;
    let prefix = params.prefix.unwrap_or_default();
    let files: Vec<Value> = backend
        .files
        .iter()
        .filter(|(key, _)| key.starts_with(&prefix))
        .take(params.limit.unwrap_or(usize::MAX))
        .map(|(key, file)| describe(key, file))
        .collect();
    Ok(Json(json!({ "files": files })))
}

pub async fn info(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(params): Query<KeyParams>,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    let backend = db.read().await;
    backend
        .files
        .get(&params.key)
        .map(|file| Json(describe(&params.key, file)))
        .ok_or_else(|| Failure::not_found(format!("File '{}' not found", params.key)))
}

pub async fn delete_one(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(body): Json<DeleteOne>,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    let mut backend = db.write().await;
    if backend.files.remove(&body.key).is_none() {
        return Err(Failure::not_found(format!("File '{}' not found", body.key)));
    }
    Ok(Json(json!({ "message": "File deleted", "key": body.key })))
}

pub async fn delete_batch(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(body): Json<DeleteBatch>,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    let mut backend = db.write().await;
    let deleted = body
        .keys
        .iter()
        .filter(|key| backend.files.remove(key.as_str()).is_some())
        .count();
    Ok(Json(json!({ "deleted": deleted })))
}
