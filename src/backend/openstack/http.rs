//! HTTP utilities for OpenStack REST API calls

use crate::error::{BackendError, BackendResult};
use anyhow::{Context, Result};
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
pub const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Sanitize response body for logging
/// Truncates long responses and drops non printable characters
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.chars().count() > MAX_LOG_BODY_LENGTH {
        let head: String = body.chars().take(MAX_LOG_BODY_LENGTH).collect();
        format!("{}... [truncated, {} bytes total]", head, body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Response of a successful request
pub struct HttpResponse {
    pub headers: HeaderMap,
    pub body: Value,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }
}

/// HTTP client wrapper for OpenStack API calls
#[derive(Clone)]
pub struct OpenstackHttp {
    client: Client,
}

impl OpenstackHttp {
    /// Create a new HTTP client. `timeout` bounds every request, connection
    /// included.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("fedreg-feeder/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// GET a JSON document with a Keystone token
    pub async fn get(&self, url: &Url, token: &str, headers: &[(&str, &str)]) -> BackendResult<Value> {
        tracing::debug!("GET {}", url);

        let mut request = self.client.get(url.clone()).header(AUTH_TOKEN_HEADER, token);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        Ok(self.send(request, url).await?.body)
    }

    /// POST to Keystone. `bearer` is the external access token used by the
    /// federated login; `body` is the token request for scoped logins.
    pub async fn post(&self, url: &Url, bearer: Option<&str>, body: Option<&Value>) -> BackendResult<HttpResponse> {
        tracing::debug!("POST {}", url);

        let mut request = self.client.post(url.clone());
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        self.send(request, url).await
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> BackendResult<HttpResponse> {
        let response = request.send().await.map_err(|source| BackendError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(|source| BackendError::Transport {
            url: url.to_string(),
            source,
        })?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(BackendError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Handle empty response
        if body.is_empty() {
            return Ok(HttpResponse {
                headers,
                body: Value::Null,
            });
        }

        let body = serde_json::from_str(&body).map_err(|e| BackendError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(HttpResponse { headers, body })
    }
}

/// Append path segments to `base`, keeping its existing path
pub fn with_segments(base: &Url, segments: &[&str]) -> BackendResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| BackendError::Decode {
            url: base.to_string(),
            reason: "cannot be used as a base URL".to_string(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// `base` with its trailing `version` segment guaranteed
pub fn versioned(base: &Url, version: &str) -> BackendResult<Url> {
    let last = base
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(|s| s.to_string()));
    if last.as_deref() == Some(version) {
        let mut url = base.clone();
        url.set_query(None);
        return Ok(url);
    }
    with_segments(base, &[version])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.starts_with(&"x".repeat(MAX_LOG_BODY_LENGTH)));
        assert!(sanitized.contains("truncated, 500 bytes total"));
    }

    #[test]
    fn test_sanitize_drops_control_characters() {
        assert_eq!(sanitize_for_log("bad\nrequest\t!"), "badrequest!");
    }

    #[test]
    fn test_with_segments_keeps_base_path() {
        let base = Url::parse("https://keystone.example.org:5000/v3").unwrap();
        let url = with_segments(&base, &["auth", "tokens"]).unwrap();
        assert_eq!(url.as_str(), "https://keystone.example.org:5000/v3/auth/tokens");

        let base = Url::parse("https://keystone.example.org:5000/v3/").unwrap();
        let url = with_segments(&base, &["auth", "tokens"]).unwrap();
        assert_eq!(url.as_str(), "https://keystone.example.org:5000/v3/auth/tokens");
    }

    #[test]
    fn test_versioned_is_idempotent() {
        let base = Url::parse("https://neutron.example.org:9696").unwrap();
        assert_eq!(
            versioned(&base, "v2.0").unwrap().as_str(),
            "https://neutron.example.org:9696/v2.0"
        );

        let base = Url::parse("https://neutron.example.org:9696/v2.0/").unwrap();
        assert_eq!(
            versioned(&base, "v2.0").unwrap().as_str(),
            "https://neutron.example.org:9696/v2.0/"
        );
    }
}
