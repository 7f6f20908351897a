//! Farmhand Farm Client
//!
//! The abstract farm interface the broker submits through, plus an
//! implementation for the Afanasy render farm server, which speaks JSON over
//! HTTP.
//!
//! # Example
//!
//! ```no_run
//! use farmhand_client::{AfanasyClient, FarmClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), farmhand_client::ClientError> {
//!     let client = AfanasyClient::new("http://localhost:51000");
//!
//!     for pool in client.list_pools().await? {
//!         println!("{}", pool);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod farm;
mod jobs;
mod pools;
mod wire;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use farm::{FarmClient, FarmConnector, StaticConnector};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

/// Default port of the Afanasy server
pub const DEFAULT_FARM_URL: &str = "http://localhost:51000";

/// HTTP client for the Afanasy server
#[derive(Debug, Clone)]
pub struct AfanasyClient {
    /// Base URL of the server (e.g., "http://localhost:51000")
    base_url: String,
    /// User the jobs are submitted as
    user_name: String,
    /// Host reported as the submitting machine
    host_name: String,
    /// HTTP client instance
    client: Client,
}

impl AfanasyClient {
    /// Create a new farm client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the Afanasy server
    ///
    /// # Example
    /// ```
    /// use farmhand_client::AfanasyClient;
    ///
    /// let client = AfanasyClient::new("http://localhost:51000");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new farm client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user_name: std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .unwrap_or_else(|_| "farmhand".to_string()),
            host_name: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            client,
        }
    }

    /// Overrides the user and host jobs are submitted as
    pub fn with_identity(mut self, user_name: impl Into<String>, host_name: impl Into<String>) -> Self {
        self.user_name = user_name.into();
        self.host_name = host_name.into();
        self
    }

    /// Get the base URL of the server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    // =============================================================================
    // Request Handling
    // =============================================================================

    /// Sends one JSON request to the server and returns the JSON reply
    ///
    /// Connection and timeout failures are mapped onto their own variants so
    /// callers can classify them without digging into reqwest.
    async fn send_request(&self, body: &Value) -> Result<Value> {
        tracing::debug!("Sending farm request to {}", self.base_url);

        let response = self
            .client
            .post(&self.base_url)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        self.handle_response(response).await
    }

    /// Handle a server response and deserialize JSON
    ///
    /// The server reports refusals either with an error status or with an
    /// `{"error": ...}` body.
    async fn handle_response(&self, response: reqwest::Response) -> Result<Value> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        let text = response.text().await.map_err(map_transport_error)?;
        let value = wire::parse_reply(&text)?;

        if let Some(message) = wire::error_message(&value) {
            return Err(ClientError::Rejected(message));
        }

        Ok(value)
    }
}

fn map_transport_error(err: reqwest::Error) -> ClientError {
    if err.is_connect() {
        ClientError::Unreachable(err.to_string())
    } else if err.is_timeout() {
        ClientError::Timeout(err.to_string())
    } else {
        ClientError::RequestFailed(err)
    }
}

/// Connector that opens an [`AfanasyClient`] session
#[derive(Debug, Clone)]
pub struct AfanasyConnector {
    url: String,
    request_timeout: Duration,
}

impl AfanasyConnector {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            request_timeout,
        }
    }
}

#[async_trait]
impl FarmConnector for AfanasyConnector {
    async fn connect(&self) -> Result<Arc<dyn FarmClient>> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(ClientError::Unavailable(format!(
                "farm url '{}' must start with http:// or https://",
                self.url
            )));
        }

        let http_client = Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| ClientError::Unavailable(format!("cannot build HTTP client: {}", e)))?;

        tracing::info!("Opened farm session with {}", self.url);
        Ok(Arc::new(AfanasyClient::with_client(self.url.clone(), http_client)))
    }
}
