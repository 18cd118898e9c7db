//! Federation Registry client
//!
//! Providers are matched by name: missing ones are created, known ones are
//! updated in place and the ones no longer configured are removed.

use super::assemble::FederatedProvider;
use crate::backend::openstack::http::sanitize_for_log;
use crate::config::CatalogEndpoints;
use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Provider as stored by the Federation Registry. Only the fields needed to
/// diff against the local payloads are read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoredProvider {
    pub uid: String,
    pub name: String,
}

/// What a publish run changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
}

/// HTTP client for the Federation Registry providers endpoint
#[derive(Clone)]
pub struct CatalogClient {
    client: Client,
    list_url: Url,
    token: String,
}

impl CatalogClient {
    pub fn new(endpoints: &CatalogEndpoints, token: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("fedreg-feeder/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            list_url: endpoints.providers.clone(),
            token: token.to_string(),
        })
    }

    fn item_url(&self, uid: &str) -> String {
        format!(
            "{}/{}",
            self.list_url.as_str().trim_end_matches('/'),
            urlencoding::encode(uid)
        )
    }

    fn write_request(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send(request: RequestBuilder) -> Result<(StatusCode, String)> {
        let response = request.send().await.context("Failed to send request")?;
        let status = response.status();
        let body = response.text().await.context("Failed to read response body")?;
        Ok((status, body))
    }

    fn failure(operation: &str, status: StatusCode, body: &str) -> anyhow::Error {
        // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
        tracing::error!("{} failed: {} - {}", operation, status, sanitize_for_log(body));
        anyhow::anyhow!("{} failed with status {}", operation, status)
    }

    /// Every provider stored in the registry
    pub async fn read(&self) -> Result<Vec<StoredProvider>> {
        tracing::info!("Looking for all Providers");
        tracing::debug!("GET {}", self.list_url);

        let request = self
            .client
            .get(self.list_url.clone())
            .query(&[("with_conn", "true")])
            .bearer_auth(&self.token);
        let (status, body) = Self::send(request).await?;

        if status != StatusCode::OK {
            return Err(Self::failure("GET providers", status, &body));
        }
        serde_json::from_str(&body).context("Failed to parse providers list")
    }

    pub async fn create(&self, provider: &FederatedProvider) -> Result<()> {
        tracing::info!("Creating new Provider={}", provider.name);
        tracing::debug!("POST {}", self.list_url);

        let request = self.write_request(self.client.post(self.list_url.clone())).json(provider);
        let (status, body) = Self::send(request).await?;

        if status != StatusCode::CREATED {
            return Err(Self::failure(&format!("Creating Provider={}", provider.name), status, &body));
        }
        tracing::info!("Created");
        Ok(())
    }

    /// Replace the stored provider `uid`. Returns `false` when the registry
    /// reports the stored data already matches.
    pub async fn update(&self, uid: &str, provider: &FederatedProvider) -> Result<bool> {
        tracing::info!("Updating Provider={}", provider.name);
        let url = self.item_url(uid);
        tracing::debug!("PUT {}", url);

        let request = self.write_request(self.client.put(url)).json(provider);
        let (status, body) = Self::send(request).await?;

        match status {
            StatusCode::OK => {
                tracing::info!("Provider={} successfully updated", provider.name);
                Ok(true)
            }
            StatusCode::NOT_MODIFIED => {
                tracing::info!("New data match stored data. Provider={} not modified", provider.name);
                Ok(false)
            }
            _ => Err(Self::failure(&format!("Updating Provider={}", provider.name), status, &body)),
        }
    }

    pub async fn remove(&self, stored: &StoredProvider) -> Result<()> {
        tracing::info!("Removing Provider={}", stored.name);
        let url = self.item_url(&stored.uid);
        tracing::debug!("DELETE {}", url);

        let request = self.write_request(self.client.delete(url));
        let (status, body) = Self::send(request).await?;

        if status != StatusCode::NO_CONTENT {
            return Err(Self::failure(&format!("Removing Provider={}", stored.name), status, &body));
        }
        tracing::info!("Removed");
        Ok(())
    }
}

/// Synchronize the registry with `providers`. Stops at the first failed
/// request. Stored providers missing from `providers` are only removed when
/// `remove_stale` is set.
pub async fn publish(
    client: &CatalogClient,
    providers: &[FederatedProvider],
    remove_stale: bool,
) -> Result<PublishSummary> {
    tracing::info!("Retrieving data from Federation Registry");
    let mut stored: HashMap<String, StoredProvider> = client
        .read()
        .await?
        .into_iter()
        .map(|p| (p.name.clone(), p))
        .collect();

    let mut summary = PublishSummary::default();
    for provider in providers {
        match stored.remove(&provider.name) {
            None => {
                client.create(provider).await?;
                summary.created += 1;
            }
            Some(existing) => {
                if client.update(&existing.uid, provider).await? {
                    summary.updated += 1;
                } else {
                    summary.unchanged += 1;
                }
            }
        }
    }

    let mut stale: Vec<StoredProvider> = stored.into_values().collect();
    stale.sort_by(|a, b| a.name.cmp(&b.name));
    if !remove_stale {
        if !stale.is_empty() {
            tracing::warn!("Keeping {} stored providers missing from this run", stale.len());
        }
        return Ok(summary);
    }
    for provider in &stale {
        client.remove(provider).await?;
        summary.removed += 1;
    }

    Ok(summary)
}
