use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use http::{header, HeaderMap, HeaderValue};

use crate::config::{BackendConfig, ServerConfig};
use crate::error::RelayError;
use crate::protocol::BackendRequest;

const EVENT_STREAM: &str = "text/event-stream";

fn build_reqwest_client(server: &ServerConfig) -> Result<reqwest::Client, RelayError> {
    let pool_idle_timeout = if server.http_pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(server.http_pool_idle_timeout_secs))
    };

    reqwest::Client::builder()
        .pool_max_idle_per_host(server.http_pool_max_idle_per_host.max(1))
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(server.connect_timeout))
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(server.timeout))
        .no_proxy()
        .build()
        .map_err(|err| RelayError::Internal(format!("Failed to build HTTP client: {err}")))
}

/// Join the configured base URL and stream path without doubling the slash.
#[must_use]
pub fn backend_stream_url(base_url: &str, stream_path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim().trim_end_matches('/'),
        stream_path.trim_start_matches('/')
    )
}

/// HTTP client for the agent backend's streaming endpoint.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    stream_url: String,
    headers: HeaderMap,
}

impl BackendClient {
    /// Build the client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] naming every missing backend setting, or
    /// [`RelayError::Internal`] if the HTTP client cannot be constructed.
    pub fn new(server: &ServerConfig, backend: &BackendConfig) -> Result<Self, RelayError> {
        let missing = backend.missing_settings();
        let (Some(base_url), Some(api_key), true) = (
            backend.base_url.as_deref(),
            backend.api_key.as_deref(),
            missing.is_empty(),
        ) else {
            return Err(RelayError::Config(missing.join(", ")));
        };

        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| {
                RelayError::Config("AGENT_API_KEY contains invalid header characters".to_string())
            })?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::with_capacity(3);
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static(EVENT_STREAM));
        headers.insert(header::AUTHORIZATION, authorization);

        Ok(Self {
            client: build_reqwest_client(server)?,
            stream_url: backend_stream_url(base_url, &backend.stream_path),
            headers,
        })
    }

    #[must_use]
    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    /// POST the message and return the backend's SSE body as a byte stream.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] when the backend is unreachable or its
    /// error body cannot be read, and [`RelayError::Backend`] with the raw body
    /// on a non-success status.
    pub async fn open_stream(
        &self,
        request: &BackendRequest,
    ) -> Result<impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static, RelayError>
    {
        let body = serde_json::to_vec(request)
            .map_err(|err| RelayError::Internal(format!("Failed to encode request: {err}")))?;

        let response = self
            .client
            .post(&self.stream_url)
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await
            .map_err(|err| {
                tracing::error!(url = %self.stream_url, error = %err, "backend request failed");
                RelayError::Transport(format!("Failed to reach backend: {err}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.map_err(|err| {
                RelayError::Transport(format!("Failed to read backend error body: {err}"))
            })?;
            tracing::error!(
                status = status.as_u16(),
                details = %details,
                "backend returned non-success status"
            );
            return Err(RelayError::Backend {
                status: status.as_u16(),
                details,
            });
        }

        tracing::debug!(status = status.as_u16(), "backend stream opened");
        Ok(response.bytes_stream())
    }
}
