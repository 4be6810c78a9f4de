//! Authenticated client for the content-library REST API.
//!
//! Every endpoint goes through the shared [`ApiClient`] wrapper, which
//! applies the bearer token, a per-request id and the standard timeout.

mod http_utils;
mod library;

pub use http_utils::create_http_client;

use crate::config::Settings;
use reqwest::Client as HttpClient;
use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the API layer
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Non-success response from the API
    #[error("API error: {0}")]
    Api(String),
    /// Error during network communication
    #[error("Network error: {0}")]
    Network(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(String),
    /// Error reading a local payload file at send time
    #[error("I/O error: {0}")]
    Io(String),
}

impl ApiError {
    /// Whether retrying the same request can reasonably succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Authenticated fetch wrapper shared by every endpoint
#[derive(Clone)]
pub struct ApiClient {
    http: HttpClient,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Builds a client from settings; trailing slashes on the base URL
    /// are trimmed so path joining stays predictable
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: create_http_client(),
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            token: settings.api_token.clone(),
        }
    }

    /// Absolute URL for an API `path`
    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    /// Starts a request with auth and request-id headers applied
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, self.url(path))
            .header("X-Request-Id", Uuid::new_v4().to_string());
        if let Some(token) = &self.token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder
    }
}
