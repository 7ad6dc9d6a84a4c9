//! File storage: uploads, presigned URLs, listings and quota.
//!
//! # Design
//! Uploads optionally check the quota first and fail locally with
//! `StorageLimitExceeded` instead of sending a payload the server would
//! reject. The check is advisory: the quota can change between the two
//! requests and the server remains authoritative.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::{ClientConfig, DEFAULT_STORAGE_TIMEOUT};
use crate::dispatch::Dispatcher;
use crate::error::ApiError;
use crate::format::format_bytes;
use crate::http::{path_segment, HttpMethod, HttpRequest, HttpResponse};
use crate::multipart::MultipartForm;
use crate::response::{check_status, decode};
use crate::transport::{Transport, UreqTransport};
use crate::types::{FileUploadResult, PresignedOperation, StorageFile, StorageQuota};

const STORAGE: &str = "/api/v1/storage";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Per-upload settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    pub content_type: Option<String>,
    /// Overrides the client's `auto_check_quota` for this upload.
    pub check_quota: Option<bool>,
}

impl UploadOptions {
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn check_quota(mut self, enabled: bool) -> Self {
        self.check_quota = Some(enabled);
        self
    }
}

#[derive(Debug, Clone)]
pub struct StorageClient {
    dispatcher: Dispatcher,
    project_slug: String,
    auto_check_quota: bool,
}

#[derive(Deserialize)]
struct UrlWire {
    url: String,
}

#[derive(Deserialize)]
struct FilesWire {
    #[serde(default)]
    files: Vec<StorageFile>,
}

impl StorageClient {
    pub fn new(config: &ClientConfig) -> Self {
        let transport = Arc::new(UreqTransport::new(config.timeout_or(DEFAULT_STORAGE_TIMEOUT)));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            dispatcher: Dispatcher::new(&config.base_url(), &config.api_key, transport),
            project_slug: config.project_slug(),
            auto_check_quota: config.auto_check_quota,
        }
    }

    fn s3_path(&self, suffix: &str) -> String {
        format!("{STORAGE}/s3/projects/{}{suffix}", self.project_slug)
    }

    // -- quota --------------------------------------------------------------

    pub fn build_get_quota(&self) -> HttpRequest {
        self.dispatcher
            .request(HttpMethod::Get, &format!("{STORAGE}/quota"))
    }

    pub fn parse_get_quota(&self, response: &HttpResponse) -> Result<StorageQuota, ApiError> {
        decode(response)
    }

    pub fn get_quota(&self) -> Result<StorageQuota, ApiError> {
        let response = self.dispatcher.send(self.build_get_quota())?;
        self.parse_get_quota(&response)
    }

    // -- upload -------------------------------------------------------------

    pub fn build_upload(&self, data: &[u8], key: &str, content_type: Option<&str>) -> HttpRequest {
        let mut form = MultipartForm::new().text("key", key);
        if let Some(content_type) = content_type {
            form = form.text("content_type", content_type);
        }
        let (form_type, body) = form
            .file(
                "file",
                key,
                content_type.unwrap_or(DEFAULT_CONTENT_TYPE),
                data,
            )
            .finish();
        self.dispatcher
            .request(HttpMethod::Post, &format!("{STORAGE}/upload"))
            .with_body(body, &form_type)
    }

    pub fn parse_upload(&self, response: &HttpResponse) -> Result<FileUploadResult, ApiError> {
        decode(response)
    }

    /// Upload `data` under `key`.
    pub fn upload(
        &self,
        data: &[u8],
        key: &str,
        options: &UploadOptions,
    ) -> Result<FileUploadResult, ApiError> {
        if options.check_quota.unwrap_or(self.auto_check_quota) {
            let quota = self.get_quota()?;
            ensure_capacity(&quota, data.len() as u64)?;
        }
        let request = self.build_upload(data, key, options.content_type.as_deref());
        let response = self.dispatcher.send(request)?;
        self.parse_upload(&response)
    }

    pub fn upload_from_path(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        options: &UploadOptions,
    ) -> Result<FileUploadResult, ApiError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| ApiError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.upload(&data, key, options)
    }

    // -- download, listing, info -------------------------------------------

    pub fn build_download_url(&self, key: &str, expires_in: u64) -> HttpRequest {
        self.dispatcher
            .request(HttpMethod::Get, &format!("{STORAGE}/download"))
            .with_query("key", key)
            .with_query("expires_in", expires_in.to_string())
    }

    pub fn parse_url(&self, response: &HttpResponse) -> Result<String, ApiError> {
        decode::<UrlWire>(response).map(|wire| wire.url)
    }

    /// Presigned download URL valid for `expires_in` seconds.
    pub fn download_url(&self, key: &str, expires_in: u64) -> Result<String, ApiError> {
        let response = self.dispatcher.send(self.build_download_url(key, expires_in))?;
        self.parse_url(&response)
    }

    pub fn build_list_files(&self, prefix: Option<&str>, limit: Option<u32>) -> HttpRequest {
        let mut request = self
            .dispatcher
            .request(HttpMethod::Get, &format!("{STORAGE}/list"));
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            request = request.with_query("prefix", prefix);
        }
        if let Some(limit) = limit.filter(|l| *l > 0) {
            request = request.with_query("limit", limit.to_string());
        }
        request
    }

    pub fn parse_list_files(&self, response: &HttpResponse) -> Result<Vec<StorageFile>, ApiError> {
        decode::<FilesWire>(response).map(|wire| wire.files)
    }

    pub fn list_files(
        &self,
        prefix: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<StorageFile>, ApiError> {
        let response = self.dispatcher.send(self.build_list_files(prefix, limit))?;
        self.parse_list_files(&response)
    }

    pub fn build_file_info(&self, key: &str) -> HttpRequest {
        self.dispatcher
            .request(HttpMethod::Get, &format!("{STORAGE}/info"))
            .with_query("key", key)
    }

    pub fn parse_file_info(&self, response: &HttpResponse) -> Result<StorageFile, ApiError> {
        decode(response)
    }

    pub fn file_info(&self, key: &str) -> Result<StorageFile, ApiError> {
        let response = self.dispatcher.send(self.build_file_info(key))?;
        self.parse_file_info(&response)
    }

    /// `Ok(false)` when the file does not exist; other failures propagate.
    pub fn file_exists(&self, key: &str) -> Result<bool, ApiError> {
        match self.file_info(key) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    // -- deletion -----------------------------------------------------------

    pub fn build_delete_file(&self, key: &str) -> Result<HttpRequest, ApiError> {
        self.dispatcher
            .json(HttpMethod::Delete, &format!("{STORAGE}/delete"), &json!({ "key": key }))
    }

    pub fn build_delete_files(&self, keys: &[&str]) -> Result<HttpRequest, ApiError> {
        self.dispatcher.json(
            HttpMethod::Delete,
            &format!("{STORAGE}/delete-batch"),
            &json!({ "keys": keys }),
        )
    }

    pub fn delete_file(&self, key: &str) -> Result<(), ApiError> {
        let response = self.dispatcher.send(self.build_delete_file(key)?)?;
        check_status(&response)
    }

    pub fn delete_files(&self, keys: &[&str]) -> Result<(), ApiError> {
        let response = self.dispatcher.send(self.build_delete_files(keys)?)?;
        check_status(&response)
    }

    // -- S3 management ------------------------------------------------------

    pub fn build_file_url(&self, key: &str, expires_in: u64) -> HttpRequest {
        let path = self.s3_path(&format!("/files/{}/url", path_segment(key)));
        self.dispatcher
            .request(HttpMethod::Get, &path)
            .with_query("expires_in", expires_in.to_string())
    }

    /// Presigned URL plus the metadata the server returns with it.
    pub fn file_url(&self, key: &str, expires_in: u64) -> Result<Value, ApiError> {
        let response = self.dispatcher.send(self.build_file_url(key, expires_in))?;
        decode(&response)
    }

    pub fn build_presigned_url(
        &self,
        key: &str,
        expires_in: u64,
        operation: PresignedOperation,
    ) -> Result<HttpRequest, ApiError> {
        self.dispatcher.json(
            HttpMethod::Post,
            &self.s3_path("/presigned-url"),
            &json!({ "file_key": key, "expires_in": expires_in, "operation": operation }),
        )
    }

    pub fn presigned_url(
        &self,
        key: &str,
        expires_in: u64,
        operation: PresignedOperation,
    ) -> Result<String, ApiError> {
        let request = self.build_presigned_url(key, expires_in, operation)?;
        let response = self.dispatcher.send(request)?;
        self.parse_url(&response)
    }

    pub fn storage_info(&self) -> Result<Value, ApiError> {
        let request = self.dispatcher.request(HttpMethod::Get, &self.s3_path("/info"));
        decode(&self.dispatcher.send(request)?)
    }

    /// Provision S3 storage in `region`. The returned credentials are only
    /// shown once.
    pub fn provision_storage(&self, region: &str) -> Result<Value, ApiError> {
        let request = self.dispatcher.json(
            HttpMethod::Post,
            &self.s3_path("/provision"),
            &json!({ "region": region }),
        )?;
        decode(&self.dispatcher.send(request)?)
    }

    pub fn available_regions(&self) -> Result<Vec<Value>, ApiError> {
        let request = self
            .dispatcher
            .request(HttpMethod::Get, &format!("{STORAGE}/s3/regions"));
        decode(&self.dispatcher.send(request)?)
    }
}

/// Fail with `StorageLimitExceeded` when `quota` cannot hold `required` more
/// bytes.
pub fn ensure_capacity(quota: &StorageQuota, required: u64) -> Result<(), ApiError> {
    let available = quota.available_bytes();
    if available >= required {
        return Ok(());
    }
    tracing::warn!(required, available, "upload rejected by local quota check");
    Err(ApiError::StorageLimitExceeded {
        status: None,
        message: format!(
            "Storage limit exceeded. Need {}, but only {} available.",
            format_bytes(required),
            format_bytes(available)
        ),
        required_bytes: required,
        available_bytes: available,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::RecordingTransport;
    use crate::http::{AUTHORIZATION, CONTENT_TYPE};

    const BASE: &str = "http://acme.localhost:3000";

    fn storage_with(responses: Vec<HttpResponse>) -> (StorageClient, Arc<RecordingTransport>) {
        let transport = RecordingTransport::with_responses(responses);
        let config = ClientConfig::new(BASE, "anon");
        (StorageClient::with_transport(&config, transport.clone()), transport)
    }

    fn quota(used: u64, total: u64) -> HttpResponse {
        HttpResponse::new(
            200,
            format!(r#"{{"storage_used_bytes":{used},"storage_quota_bytes":{total}}}"#),
        )
    }

    #[test]
    fn upload_over_quota_fails_without_upload_request() {
        let n = 100;
        let (storage, transport) = storage_with(vec![quota(900, 900 + n)]);
        let data = vec![0u8; (n + 1) as usize];
        let err = storage
            .upload(&data, "big.bin", &UploadOptions::default())
            .unwrap_err();
        match err {
            ApiError::StorageLimitExceeded {
                required_bytes,
                available_bytes,
                ..
            } => {
                assert_eq!(required_bytes, n + 1);
                assert_eq!(available_bytes, n);
            }
            other => panic!("unexpected {other:?}"),
        }
        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].url.ends_with("/api/v1/storage/quota"));
    }

    #[test]
    fn upload_with_check_disabled_skips_quota() {
        let (storage, transport) = storage_with(vec![HttpResponse::new(
            201,
            r#"{"key":"big.bin","size":101}"#,
        )]);
        let data = vec![0u8; 101];
        let result = storage
            .upload(&data, "big.bin", &UploadOptions::default().check_quota(false))
            .unwrap();
        assert_eq!(result.size, 101);
        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].url.ends_with("/api/v1/storage/upload"));
    }

    #[test]
    fn upload_within_quota_sends_multipart() {
        let (storage, transport) = storage_with(vec![
            quota(0, 1024),
            HttpResponse::new(201, r#"{"key":"a.txt","size":5,"content_type":"text/plain"}"#),
        ]);
        storage
            .upload(b"hello", "a.txt", &UploadOptions::default().content_type("text/plain"))
            .unwrap();
        let sent = transport.requests();
        assert_eq!(sent.len(), 2);
        let upload = &sent[1];
        assert_eq!(upload.method, HttpMethod::Post);
        assert_eq!(upload.header(AUTHORIZATION), Some("Bearer anon"));
        assert!(upload
            .header(CONTENT_TYPE)
            .unwrap()
            .starts_with("multipart/form-data; boundary="));
        let body = String::from_utf8(upload.body.clone().unwrap()).unwrap();
        assert!(body.contains("name=\"key\"\r\n\r\na.txt\r\n"));
        assert!(body.contains("name=\"content_type\"\r\n\r\ntext/plain\r\n"));
        assert!(body.contains("filename=\"a.txt\""));
        assert!(body.contains("\r\n\r\nhello\r\n"));
    }

    #[test]
    fn client_default_can_disable_check() {
        let transport = RecordingTransport::with_responses([HttpResponse::new(201, r#"{"key":"k"}"#)]);
        let config = ClientConfig::new(BASE, "anon").with_auto_check_quota(false);
        let storage = StorageClient::with_transport(&config, transport.clone());
        storage.upload(b"x", "k", &UploadOptions::default()).unwrap();
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn server_side_limit_is_mapped() {
        let (storage, _) = storage_with(vec![HttpResponse::new(
            413,
            r#"{"detail":"Storage limit exceeded","required_bytes":10,"available_bytes":2}"#,
        )]);
        let err = storage
            .upload(b"0123456789", "k", &UploadOptions::default().check_quota(false))
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::StorageLimitExceeded {
                required_bytes: 10,
                available_bytes: 2,
                ..
            }
        ));
    }

    #[test]
    fn file_exists_maps_not_found_to_false() {
        let (storage, _) = storage_with(vec![
            HttpResponse::new(404, r#"{"detail":"File not found"}"#),
            HttpResponse::new(200, r#"{"key":"a.txt","size":5}"#),
            HttpResponse::new(500, "boom"),
        ]);
        assert!(!storage.file_exists("missing").unwrap());
        assert!(storage.file_exists("a.txt").unwrap());
        assert!(matches!(
            storage.file_exists("a.txt"),
            Err(ApiError::Server { .. })
        ));
    }

    #[test]
    fn download_and_list_requests() {
        let (storage, _) = storage_with(Vec::new());
        let req = storage.build_download_url("docs/a b.txt", 3600);
        assert_eq!(req.url, "http://acme.localhost:3000/api/v1/storage/download");
        assert_eq!(req.query_value("key"), Some("docs/a b.txt"));
        assert_eq!(req.query_value("expires_in"), Some("3600"));

        let req = storage.build_list_files(Some("docs/"), Some(10));
        assert_eq!(req.query_value("prefix"), Some("docs/"));
        assert_eq!(req.query_value("limit"), Some("10"));

        let req = storage.build_list_files(None, Some(0));
        assert!(req.query.is_empty());
    }

    #[test]
    fn delete_requests_carry_json_keys() {
        let (storage, _) = storage_with(Vec::new());
        let req = storage.build_delete_files(&["a", "b"]).unwrap();
        assert_eq!(req.method, HttpMethod::Delete);
        assert!(req.url.ends_with("/api/v1/storage/delete-batch"));
        let body: Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"keys": ["a", "b"]}));
    }

    #[test]
    fn s3_paths_use_project_slug() {
        let (storage, _) = storage_with(Vec::new());
        let req = storage.build_file_url("a.txt", 60);
        assert_eq!(
            req.url,
            "http://acme.localhost:3000/api/v1/storage/s3/projects/acme/files/a.txt/url"
        );
        let req = storage.build_file_url("docs/a b.txt", 60);
        assert!(
            req.url.ends_with("/s3/projects/acme/files/docs%2Fa%20b.txt/url"),
            "{}",
            req.url
        );
        let req = storage
            .build_presigned_url("a.txt", 60, PresignedOperation::Put)
            .unwrap();
        let body: Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["operation"], "put");
        assert_eq!(body["file_key"], "a.txt");
    }

    #[test]
    fn ensure_capacity_boundary() {
        let q = StorageQuota {
            used_bytes: 0,
            quota_bytes: 10,
        };
        assert!(ensure_capacity(&q, 10).is_ok());
        let err = ensure_capacity(&q, 11).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Storage limit exceeded. Need 11 B, but only 10 B available."
        );
    }
}
