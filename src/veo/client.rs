//! VeoClient - handles communication with the Gemini video generation API.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use super::types::{ErrorEnvelope, Operation, PredictRequest};
use crate::credential::ApiKey;
use crate::generation::VideoService;
use crate::request::GenerationRequest;

/// Default base URL for the Gemini API.
pub const VEO_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Header carrying the API key on API calls.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Default timeout for HTTP requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection timeout (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the Gemini long-running video endpoints.
///
/// The key is passed per call rather than stored, so whatever key the host
/// has selected at the time is the one used.
#[derive(Clone)]
pub struct VeoClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl VeoClient {
    /// Create a client for the public Gemini API.
    pub fn new() -> Result<Self, VeoError> {
        Self::with_base_url(VEO_API_BASE_URL.to_string())
    }

    /// Create a client against a custom base URL.
    ///
    /// Useful for testing against a mock server.
    pub fn with_base_url(base_url: String) -> Result<Self, VeoError> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a generation job.
    ///
    /// Sends `POST {base}/models/{model}:predictLongRunning` asking for
    /// exactly one video with the request's prompt, aspect ratio and
    /// resolution. Returns the operation handle to poll.
    ///
    /// # Errors
    ///
    /// Returns `VeoError::Api` for non-2xx responses, `VeoError::InvalidResponse`
    /// if the handle has no name, or `VeoError::HttpError` if the request fails.
    pub async fn submit(
        &self,
        request: &GenerationRequest,
        key: &ApiKey,
    ) -> Result<Operation, VeoError> {
        let url = format!(
            "{}/models/{}:predictLongRunning",
            self.base_url,
            request.model_id()
        );

        let response = self
            .http_client
            .post(&url)
            .header(API_KEY_HEADER, key.expose())
            .json(&PredictRequest::from_request(request))
            .send()
            .await?;

        let operation: Operation = Self::parse_response(response).await?;
        if operation.name.is_empty() {
            return Err(VeoError::InvalidResponse(
                "operation handle has no name".to_string(),
            ));
        }
        Ok(operation)
    }

    /// Fetch the current state of an operation by name.
    ///
    /// Status endpoint: `GET {base}/{operation name}`.
    pub async fn get_operation(&self, name: &str, key: &ApiKey) -> Result<Operation, VeoError> {
        let url = format!("{}/{}", self.base_url, name);

        let response = self
            .http_client
            .get(&url)
            .header(API_KEY_HEADER, key.expose())
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Download a video to disk, streaming the body.
    ///
    /// The locator must already carry its key; no auth header is sent.
    /// Parent directories of `dest` are created as needed, and a file left
    /// half written by a failed transfer is removed.
    pub async fn download_video(&self, locator: &str, dest: &Path) -> Result<PathBuf, VeoError> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // The locator embeds the key, so reqwest errors lose their URL here.
        let response = self
            .http_client
            .get(locator)
            .send()
            .await
            .map_err(|e| VeoError::HttpError(e.without_url()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(VeoError::Api {
                status: status.as_u16(),
                message: format!("Video download failed: {}", extract_error_message(&error_text)),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        if let Err(e) = Self::write_body(response, &mut file).await {
            drop(file);
            remove_partial(dest).await;
            return Err(e);
        }

        Ok(dest.to_path_buf())
    }

    async fn write_body(
        response: reqwest::Response,
        file: &mut tokio::fs::File,
    ) -> Result<(), VeoError> {
        use futures_util::StreamExt;

        let mut stream = response.bytes_stream();
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| VeoError::HttpError(e.without_url()))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn parse_response(response: reqwest::Response) -> Result<Operation, VeoError> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            log::warn!("Gemini API returned {}: {}", status, error_text);
            return Err(VeoError::Api {
                status: status.as_u16(),
                message: extract_error_message(&error_text),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| VeoError::InvalidResponse(format!("{}: {}", e, body)))
    }
}

impl VideoService for VeoClient {
    async fn start(&self, request: &GenerationRequest, key: &ApiKey) -> Result<Operation, VeoError> {
        self.submit(request, key).await
    }

    async fn refresh(&self, operation: &Operation, key: &ApiKey) -> Result<Operation, VeoError> {
        self.get_operation(&operation.name, key).await
    }
}

/// Delete a partially written download. Best effort.
pub async fn remove_partial(dest: &Path) {
    match tokio::fs::remove_file(dest).await {
        Ok(()) => log::debug!("Removed partial download {}", dest.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Could not remove partial download {}: {}", dest.display(), e),
    }
}

/// Pull `error.message` out of a JSON error body, falling back to the raw text.
fn extract_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ => body.trim().to_string(),
    }
}

/// Errors that can occur while talking to the Gemini API.
#[derive(Debug, thiserror::Error)]
pub enum VeoError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code of the response
        status: u16,
        /// Provider-supplied message, or the raw body
        message: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl VeoError {
    /// The message to surface to the user.
    ///
    /// For API errors this is the provider's own text; everything else uses
    /// the error's display form.
    pub fn remote_message(&self) -> String {
        match self {
            VeoError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
