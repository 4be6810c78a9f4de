//! HTTP utilities for the content-library API
//!
//! Provides common request/response handling to eliminate code
//! duplication across endpoint implementations.

use super::ApiError;
use crate::config::get_api_http_timeout_secs;
use reqwest::{Client as HttpClient, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Creates an HTTP client configured with the standard API timeout.
///
/// Uses `API_HTTP_TIMEOUT_SECS` environment variable or 30s default.
/// This prevents infinite hangs when the API is slow or unresponsive.
#[must_use]
pub fn create_http_client() -> HttpClient {
    let timeout = Duration::from_secs(get_api_http_timeout_secs());
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Sends `request` and maps transport failures to [`ApiError::Network`].
///
/// # Errors
///
/// Returns `ApiError::Network` on connectivity issues or timeouts.
pub async fn send_request(request: RequestBuilder) -> Result<Response, ApiError> {
    request
        .send()
        .await
        .map_err(|e| ApiError::Network(e.to_string()))
}

/// Checks the response status and parses the JSON body into `T`.
///
/// # Errors
///
/// Returns `ApiError::Api` on non-success status codes or
/// `ApiError::Json` if parsing fails.
pub async fn read_json_response<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Api(clean_error_body(status, &body)));
    }

    response
        .json()
        .await
        .map_err(|e| ApiError::Json(e.to_string()))
}

/// Builds a displayable message from an error response body.
///
/// HTML error pages from proxies are elided and long bodies truncated so
/// raw markup never reaches notifications or logs.
fn clean_error_body(status: u16, body: &str) -> String {
    const MAX_BODY_CHARS: usize = 500;

    let trimmed = body.trim_start();
    let is_html = trimmed.starts_with("<!DOCTYPE")
        || trimmed.starts_with("<html")
        || trimmed.starts_with("<HTML");
    if is_html {
        return format!("{status} (server returned HTML error page)");
    }

    if body.is_empty() {
        return status.to_string();
    }

    if body.chars().count() > MAX_BODY_CHARS {
        let truncated: String = body.chars().take(MAX_BODY_CHARS).collect();
        return format!("{status} - {truncated}... (truncated)");
    }

    format!("{status} - {body}")
}
