//! Outbound HTTP client driving the recorded request against the SUT,
//! built the same hyper 1.x + hyper-util legacy-client way this codebase's
//! other TCP HTTP client does it.

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response as HyperResponse, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use replay_trace_model::Test;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("invalid target URL: {0}")]
    InvalidUri(#[from] hyper::http::uri::InvalidUri),
    #[error("failed to build request: {0}")]
    Build(#[from] hyper::http::Error),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
    #[error("failed to read response body: {0}")]
    Body(String),
}

impl HttpClientError {
    /// Lower-cased message this executor's crash detector matches against.
    pub fn message(&self) -> String {
        self.to_string().to_ascii_lowercase()
    }
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: i64,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

pub struct HttpClient {
    inner: Client<HttpConnector, Full<Bytes>>,
    service_url: String,
}

impl HttpClient {
    pub fn new(service_url: impl Into<String>) -> Self {
        Self {
            inner: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
            service_url: service_url.into(),
        }
    }

    /// Sends the recorded inbound request for `test`, applying the header
    /// rules: `x-td-trace-id` always, `x-td-fetch-env-vars:
    /// true` iff the test carries `ENV_VARS` metadata, a default
    /// `Content-Type: application/json` when a body is present and no
    /// recorded header overrides it, then every recorded header applied
    /// last (so recordings win over these defaults).
    pub async fn send(&self, trace_id: &str, test: &Test, timeout: Duration) -> Result<RawResponse, HttpClientError> {
        let uri: Uri = self.target_uri(&test.path)?;

        let mut builder = Request::builder().method(test.method.as_str()).uri(uri);
        builder = builder.header("x-td-trace-id", trace_id);
        if test.metadata.contains_key("ENV_VARS") {
            builder = builder.header("x-td-fetch-env-vars", "true");
        }
        if test.request_body.is_some() && !has_content_type(&test.headers) {
            builder = builder.header("Content-Type", "application/json");
        }
        for (key, value) in &test.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let body = Full::new(Bytes::from(test.request_body.clone().unwrap_or_default()));
        let request = builder.body(body)?;

        let response = tokio::time::timeout(timeout, self.inner.request(request))
            .await
            .map_err(|_| HttpClientError::Timeout(timeout))??;

        collect_response(response).await
    }

    /// 2-second HEAD liveness probe used by crash detection.
    pub async fn probe_alive(&self) -> bool {
        let Ok(uri) = self.target_uri("/") else {
            return false;
        };
        let Ok(request) = Request::builder().method("HEAD").uri(uri).body(Full::new(Bytes::new())) else {
            return false;
        };
        matches!(
            tokio::time::timeout(Duration::from_secs(2), self.inner.request(request)).await,
            Ok(Ok(_))
        )
    }

    fn target_uri(&self, path: &str) -> Result<Uri, hyper::http::uri::InvalidUri> {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.parse()
        } else {
            format!("{}{}", self.service_url.trim_end_matches('/'), path).parse()
        }
    }
}

fn has_content_type(headers: &HashMap<String, String>) -> bool {
    headers.keys().any(|k| k.eq_ignore_ascii_case("content-type"))
}

async fn collect_response(response: HyperResponse<Incoming>) -> Result<RawResponse, HttpClientError> {
    let status = response.status().as_u16() as i64;
    let mut headers = HashMap::new();
    for (name, value) in response.headers() {
        if let Ok(value) = value.to_str() {
            headers.insert(name.to_string(), value.to_string());
        }
    }
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|err| HttpClientError::Body(err.to_string()))?
        .to_bytes()
        .to_vec();
    Ok(RawResponse { status, headers, body })
}
