//! Builds authorized requests against one base URL and sends them through a
//! `Transport`.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::Transport;

/// Base URL, API key and transport for one domain client.
///
/// Cloning is cheap; clones share the transport.
#[derive(Clone)]
pub struct Dispatcher {
    base_url: String,
    api_key: String,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(base_url: &str, api_key: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// A request for `path` carrying `Authorization: Bearer <api key>`.
    pub fn request(&self, method: HttpMethod, path: &str) -> HttpRequest {
        HttpRequest::new(method, self.url(path)).with_bearer(&self.api_key)
    }

    /// Like `request`, with `payload` serialized as the JSON body.
    pub fn json<T: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        path: &str,
        payload: &T,
    ) -> Result<HttpRequest, ApiError> {
        self.request(method, path).with_json(payload)
    }

    /// Execute one round trip. Non-2xx statuses are returned as data.
    pub fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        tracing::debug!(method = request.method.as_str(), url = %request.url, "dispatching request");
        let response = self.transport.execute(&request).map_err(|err| {
            tracing::warn!(method = request.method.as_str(), url = %request.url, error = %err, "transport failure");
            err
        })?;
        tracing::debug!(status = response.status, url = %request.url, "received response");
        Ok(response)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording transport shared by the unit tests of the domain clients.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    pub struct RecordingTransport {
        pub requests: Mutex<Vec<HttpRequest>>,
        responses: Mutex<VecDeque<HttpResponse>>,
    }

    impl RecordingTransport {
        pub fn with_responses(responses: impl IntoIterator<Item = HttpResponse>) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                responses: Mutex::new(responses.into_iter().collect()),
            })
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Transport for RecordingTransport {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ApiError::network("no canned response left"))
        }
    }
}
