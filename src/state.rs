use crate::config::AppConfig;
use crate::error::RelayError;
use crate::transport::BackendClient;

/// Shared application state accessible to all handlers.
///
/// The backend client is built once at startup. A missing backend setting is
/// kept as the error itself so every chat request reports it without touching
/// the network.
pub struct AppState {
    pub config: AppConfig,
    backend: Result<BackendClient, RelayError>,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        let backend = BackendClient::new(&config.server, &config.backend);
        match &backend {
            Ok(client) => {
                tracing::info!(stream_url = %client.stream_url(), "agent backend configured");
            }
            Err(err) => {
                tracing::warn!(error = %err, "agent backend is not configured; chat requests will fail");
            }
        }
        Self { config, backend }
    }

    /// The backend client, or the configuration error that prevented it.
    ///
    /// # Errors
    ///
    /// Returns the startup [`RelayError`] when the backend is not configured.
    pub fn backend(&self) -> Result<&BackendClient, RelayError> {
        self.backend.as_ref().map_err(Clone::clone)
    }

    #[must_use]
    pub fn backend_configured(&self) -> bool {
        self.backend.is_ok()
    }
}
