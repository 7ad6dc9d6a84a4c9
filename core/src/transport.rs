//! Execution of `HttpRequest` values.
//!
//! # Design
//! `Transport` is the single seam between request construction and the
//! network. `UreqTransport` is the default blocking implementation; tests
//! and embedders that already own an HTTP stack provide their own.
//!
//! The agent is configured with `http_status_as_error(false)` so 4xx/5xx
//! responses come back as data and status interpretation stays in
//! `response`.

use std::time::Duration;

use ureq::{Agent, RequestBuilder};

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Performs exactly one HTTP round trip per call.
pub trait Transport: Send + Sync {
    /// Execute `request`. Only failures that prevent a response from being
    /// received are errors; any status code is a successful return.
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// Blocking transport backed by a `ureq` agent.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }
}

fn prepare<B>(mut builder: RequestBuilder<B>, request: &HttpRequest) -> RequestBuilder<B> {
    for (key, value) in &request.query {
        builder = builder.query(key, value);
    }
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let url = request.url.as_str();
        let body = request.body.as_deref();

        let result = match request.method {
            HttpMethod::Get => prepare(self.agent.get(url), request).call(),
            HttpMethod::Delete => {
                let builder = prepare(self.agent.delete(url), request);
                match body {
                    Some(bytes) => builder.force_send_body().send(bytes),
                    None => builder.call(),
                }
            }
            HttpMethod::Post => send(prepare(self.agent.post(url), request), body),
            HttpMethod::Put => send(prepare(self.agent.put(url), request), body),
            HttpMethod::Patch => send(prepare(self.agent.patch(url), request), body),
        };
        let mut response = result.map_err(ApiError::network)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        // A complete response was received; undecodable bytes are left for
        // status mapping and JSON parsing to reject.
        let bytes = response
            .body_mut()
            .read_to_vec()
            .map_err(ApiError::network)?;
        let body = String::from_utf8_lossy(&bytes).into_owned();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn send(
    builder: RequestBuilder<ureq::typestate::WithBody>,
    body: Option<&[u8]>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(bytes) => builder.send(bytes),
        None => builder.send_empty(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;

    use super::*;
    use crate::response::{check_status, decode};

    /// Serve one raw HTTP/1.1 response and return the URL to request.
    fn serve_once(status_line: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(body).unwrap();
            stream.flush().unwrap();
        });
        format!("http://{addr}/api/v1/db/t")
    }

    #[test]
    fn invalid_utf8_error_body_keeps_status() {
        let url = serve_once("404 Not Found", b"\xff\xfe not utf-8");
        let transport = UreqTransport::new(Duration::from_secs(5));
        let response = transport
            .execute(&HttpRequest::new(HttpMethod::Get, url))
            .unwrap();
        assert_eq!(response.status, 404);
        assert!(matches!(
            check_status(&response),
            Err(ApiError::NotFound { .. })
        ));
    }

    #[test]
    fn invalid_utf8_inside_json_string_still_decodes() {
        let url = serve_once("200 OK", b"{\"data\":[{\"name\":\"\xff\xfe\"}],\"count\":1}");
        let transport = UreqTransport::new(Duration::from_secs(5));
        let response = transport
            .execute(&HttpRequest::new(HttpMethod::Get, url))
            .unwrap();
        let value: serde_json::Value = decode(&response).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["data"][0]["name"], "\u{fffd}\u{fffd}");
    }

    #[test]
    fn refused_connection_is_network_error() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let transport = UreqTransport::new(Duration::from_secs(5));
        let err = transport
            .execute(&HttpRequest::new(HttpMethod::Get, format!("http://{addr}/")))
            .unwrap_err();
        assert!(matches!(err, ApiError::Network(_)), "{err:?}");
    }
}
