//! HTTP transport for the ERS API.
//!
//! [`ErsTransport`] is the seam between the synchronization logic and the
//! network. [`HttpTransport`] implements it with `reqwest`, using HTTP basic
//! auth against ERS and a bearer key against the Meraki dashboard;
//! [`LimitedTransport`] wraps any transport with a shared semaphore so
//! that the number of simultaneous requests never exceeds the configured
//! connection limit, however many futures are in flight.
//!
//! Non-success statuses are returned to the caller as an [`ErsResponse`];
//! only connection-level failures become [`ErsError::Transport`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, trace};

use crate::config::ErsConfig;
use crate::endpoints::envelope;
use crate::error::{ErsError, ErsResult};

const APPLICATION_JSON: &str = "application/json";

/// Status and decoded body of one ERS response.
#[derive(Debug, Clone, PartialEq)]
pub struct ErsResponse {
    /// HTTP status code
    pub status: u16,
    /// JSON body; `Null` when empty, `String` when not JSON
    pub body: Value,
}

impl ErsResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Human-readable error message carried by this response.
    pub fn error_message(&self) -> String {
        extract_error_message(&self.body)
    }
}

/// Pulls the first message title out of an `ERSResponse` error envelope.
///
/// Falls back to the raw body text when the envelope is absent.
pub fn extract_error_message(body: &Value) -> String {
    body.get(envelope::ERS_RESPONSE)
        .and_then(|r| r.get("messages"))
        .and_then(|m| m.get(0))
        .and_then(|m| m.get("title"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| match body {
            Value::Null => "no response body".to_string(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}

/// Minimal REST surface used by the synchronizer.
#[async_trait]
pub trait ErsTransport: Send + Sync {
    /// GET a path relative to the node base URL.
    async fn get(&self, path: &str) -> ErsResult<ErsResponse>;

    /// POST a JSON body.
    async fn post(&self, path: &str, body: &Value) -> ErsResult<ErsResponse>;

    /// DELETE a path.
    async fn delete(&self, path: &str) -> ErsResult<ErsResponse>;
}

#[async_trait]
impl<T: ErsTransport + ?Sized> ErsTransport for Arc<T> {
    async fn get(&self, path: &str) -> ErsResult<ErsResponse> {
        (**self).get(path).await
    }

    async fn post(&self, path: &str, body: &Value) -> ErsResult<ErsResponse> {
        (**self).post(path, body).await
    }

    async fn delete(&self, path: &str) -> ErsResult<ErsResponse> {
        (**self).delete(path).await
    }
}

/// Credentials attached to every request.
enum Auth {
    /// ERS admin or operator account
    Basic { username: String, password: String },
    /// Meraki dashboard API key
    Bearer(String),
}

/// `reqwest` implementation with JSON headers and basic or bearer auth.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    auth: Auth,
}

impl HttpTransport {
    /// Build a client for the configured ERS node.
    pub fn new(config: &ErsConfig) -> ErsResult<Self> {
        let base_url = config.base_url();
        Ok(Self {
            client: build_client(config, config.server.verify_tls, &base_url)?,
            base_url,
            auth: Auth::Basic {
                username: config.server.username.clone(),
                password: config.server.password.clone(),
            },
        })
    }

    /// Build a client for the Meraki dashboard API.
    pub fn meraki(config: &ErsConfig) -> ErsResult<Self> {
        let base_url = config.meraki.base_url.trim_end_matches('/').to_string();
        Ok(Self {
            client: build_client(config, true, &base_url)?,
            base_url,
            auth: Auth::Bearer(config.meraki.api_key.clone()),
        })
    }

    /// Base URL every request path is appended to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        method: &str,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> ErsResult<ErsResponse> {
        let request = match &self.auth {
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::Bearer(key) => request.bearer_auth(key),
        };
        let response = request
            .send()
            .await
            .map_err(|e| ErsError::transport(method, path, e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ErsError::transport(method, path, e.to_string()))?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        debug!(method, path, status, "HTTP response");
        Ok(ErsResponse { status, body })
    }
}

fn build_client(config: &ErsConfig, verify_tls: bool, base_url: &str) -> ErsResult<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(config.timeout())
        .pool_max_idle_per_host(config.limits.max_connections)
        .danger_accept_invalid_certs(!verify_tls)
        .build()
        .map_err(|e| ErsError::transport("INIT", base_url, e.to_string()))
}

#[async_trait]
impl ErsTransport for HttpTransport {
    async fn get(&self, path: &str) -> ErsResult<ErsResponse> {
        self.send("GET", path, self.client.get(self.url(path))).await
    }

    async fn post(&self, path: &str, body: &Value) -> ErsResult<ErsResponse> {
        self.send("POST", path, self.client.post(self.url(path)).json(body))
            .await
    }

    async fn delete(&self, path: &str) -> ErsResult<ErsResponse> {
        self.send("DELETE", path, self.client.delete(self.url(path)))
            .await
    }
}

/// Caps simultaneous requests through an inner transport.
///
/// Clones of the wrapping `Arc` share one semaphore, so the bound holds
/// across every concurrent operation of a run.
pub struct LimitedTransport<T> {
    inner: T,
    permits: Semaphore,
    limit: usize,
}

impl<T: ErsTransport> LimitedTransport<T> {
    /// Wrap `inner`, allowing at most `limit` requests in flight.
    pub fn new(inner: T, limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            inner,
            permits: Semaphore::new(limit),
            limit,
        }
    }

    /// Configured connection limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Access the wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    async fn acquire(&self, method: &str, path: &str) -> ErsResult<tokio::sync::SemaphorePermit<'_>> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ErsError::transport(method, path, "connection pool closed"))?;
        trace!(
            method,
            path,
            available = self.permits.available_permits(),
            "Acquired connection slot"
        );
        Ok(permit)
    }
}

#[async_trait]
impl<T: ErsTransport> ErsTransport for LimitedTransport<T> {
    async fn get(&self, path: &str) -> ErsResult<ErsResponse> {
        let _permit = self.acquire("GET", path).await?;
        self.inner.get(path).await
    }

    async fn post(&self, path: &str, body: &Value) -> ErsResult<ErsResponse> {
        let _permit = self.acquire("POST", path).await?;
        self.inner.post(path, body).await
    }

    async fn delete(&self, path: &str) -> ErsResult<ErsResponse> {
        let _permit = self.acquire("DELETE", path).await?;
        self.inner.delete(path).await
    }
}

/// Open a connection-limited HTTP session for the configured node.
pub fn connect(config: &ErsConfig) -> ErsResult<Arc<dyn ErsTransport>> {
    let http = HttpTransport::new(config)?;
    Ok(Arc::new(LimitedTransport::new(
        http,
        config.limits.max_connections,
    )))
}

/// Open a connection-limited session for the Meraki dashboard API.
pub fn connect_meraki(config: &ErsConfig) -> ErsResult<Arc<dyn ErsTransport>> {
    let http = HttpTransport::meraki(config)?;
    Ok(Arc::new(LimitedTransport::new(
        http,
        config.limits.max_connections,
    )))
}
