//! Classify responses into typed results or `ApiError`s.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::http::HttpResponse;

/// Fields the server may place in an error body.
#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    detail: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    required_bytes: Option<u64>,
    #[serde(default)]
    available_bytes: Option<u64>,
}

impl ErrorPayload {
    fn message(&self) -> Option<String> {
        self.detail
            .as_ref()
            .map(value_text)
            .or_else(|| self.message.clone())
            .or_else(|| self.error.as_ref().map(value_text))
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Return `Ok(())` for 2xx responses, otherwise the mapped error.
pub fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    let err = map_error(response);
    tracing::warn!(status = response.status, error = %err, "request failed");
    Err(err)
}

/// Check the status, then deserialize the body as `T`.
pub fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ApiError> {
    check_status(response)?;
    serde_json::from_str(&response.body).map_err(ApiError::Parse)
}

/// Map a non-2xx response to the error taxonomy.
pub fn map_error(response: &HttpResponse) -> ApiError {
    let status = response.status;
    let payload: Option<ErrorPayload> = serde_json::from_str(&response.body).ok();
    let message = payload
        .as_ref()
        .and_then(ErrorPayload::message)
        .unwrap_or_else(|| fallback_message(response));

    if let Some(ErrorPayload {
        required_bytes: Some(required_bytes),
        available_bytes: Some(available_bytes),
        ..
    }) = payload
    {
        if (400..500).contains(&status) {
            return ApiError::StorageLimitExceeded {
                status: Some(status),
                message,
                required_bytes,
                available_bytes,
            };
        }
    }

    match status {
        401 => ApiError::Authentication { message },
        403 => ApiError::Permission { message },
        404 => ApiError::NotFound { message },
        413 => ApiError::StorageLimitExceeded {
            status: Some(413),
            message,
            required_bytes: 0,
            available_bytes: 0,
        },
        429 => ApiError::RateLimit { message },
        400..=499 => ApiError::Validation { status, message },
        500..=599 => ApiError::Server { status, message },
        _ => ApiError::Http {
            status,
            body: response.body.clone(),
        },
    }
}

fn fallback_message(response: &HttpResponse) -> String {
    let body = response.body.trim();
    if body.is_empty() {
        format!("HTTP {}", response.status)
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resp(status: u16, body: &str) -> HttpResponse {
        HttpResponse::new(status, body)
    }

    #[test]
    fn status_classes() {
        assert!(matches!(map_error(&resp(401, "")), ApiError::Authentication { .. }));
        assert!(matches!(map_error(&resp(403, "")), ApiError::Permission { .. }));
        assert!(matches!(map_error(&resp(404, "")), ApiError::NotFound { .. }));
        assert!(matches!(map_error(&resp(429, "")), ApiError::RateLimit { .. }));
        assert!(matches!(
            map_error(&resp(422, "")),
            ApiError::Validation { status: 422, .. }
        ));
        assert!(matches!(
            map_error(&resp(502, "")),
            ApiError::Server { status: 502, .. }
        ));
        assert!(matches!(
            map_error(&resp(302, "moved")),
            ApiError::Http { status: 302, .. }
        ));
    }

    #[test]
    fn message_from_detail() {
        let err = map_error(&resp(400, r#"{"detail":"bad filter"}"#));
        match err {
            ApiError::Validation { message, .. } => assert_eq!(message, "bad filter"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn structured_detail_is_rendered_as_json() {
        let err = map_error(&resp(422, r#"{"detail":[{"loc":["body","email"]}]}"#));
        match err {
            ApiError::Validation { message, .. } => assert!(message.contains("email")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unparseable_body_becomes_message() {
        let err = map_error(&resp(500, "upstream exploded"));
        match err {
            ApiError::Server { message, .. } => assert_eq!(message, "upstream exploded"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn storage_limit_with_byte_counts() {
        let body = r#"{"detail":"quota","required_bytes":2048,"available_bytes":10}"#;
        let err = map_error(&resp(413, body));
        assert!(matches!(
            err,
            ApiError::StorageLimitExceeded {
                required_bytes: 2048,
                available_bytes: 10,
                ..
            }
        ));
        assert_eq!(err.status(), Some(413));
    }

    #[test]
    fn decode_reports_parse_errors_separately() {
        let err = decode::<Vec<u32>>(&resp(200, "not json")).unwrap_err();
        assert!(matches!(err, ApiError::Parse(_)));
        let err = decode::<Vec<u32>>(&resp(500, "not json")).unwrap_err();
        assert!(matches!(err, ApiError::Server { .. }));
    }
}
