//! OpenStack provider backend
//!
//! # Module Structure
//!
//! - [`http`] - Keystone token aware HTTP client
//! - [`auth`] - Federated login, project scoping and service catalog
//! - [`resources`] - Quota, flavor, image, network and project listing

pub mod auth;
pub mod http;
pub mod resources;

use crate::backend::{AuthContext, ProviderBackend, ProviderSession, RawNetwork};
use crate::error::{BackendError, BackendResult};
use crate::model::{BlockStorageService, ComputeService, NetworkService, ProjectInfo, ServiceName};
use anyhow::Result;
use async_trait::async_trait;
use auth::ServiceCatalog;
use http::OpenstackHttp;
use resources::ResourceFetcher;
use std::time::Duration;
use url::Url;

/// Connects to OpenStack providers through their Keystone endpoint
#[derive(Clone)]
pub struct OpenstackBackend {
    http: OpenstackHttp,
}

impl OpenstackBackend {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: OpenstackHttp::new(timeout)?,
        })
    }
}

#[async_trait]
impl ProviderBackend for OpenstackBackend {
    async fn connect(&self, ctx: &AuthContext) -> BackendResult<Box<dyn ProviderSession>> {
        tracing::debug!(
            "Connecting to {} for project {} in region {}",
            ctx.auth_url,
            ctx.project_id,
            ctx.region_name
        );

        let scoped = auth::authenticate(&self.http, ctx).await?;
        let identity_v3 = auth::identity_v3_url(&ctx.auth_url).map_err(|e| BackendError::Connection(e.to_string()))?;

        Ok(Box::new(OpenstackSession {
            http: self.http.clone(),
            identity_v3,
            token: scoped.token,
            project_id: scoped.project_id,
            catalog: scoped.catalog,
            region: ctx.region_name.clone(),
        }))
    }
}

/// Project scoped OpenStack session
pub struct OpenstackSession {
    http: OpenstackHttp,
    identity_v3: Url,
    token: String,
    project_id: String,
    catalog: ServiceCatalog,
    region: String,
}

impl OpenstackSession {
    fn fetcher(&self) -> ResourceFetcher<'_> {
        ResourceFetcher {
            http: &self.http,
            token: &self.token,
            project_id: &self.project_id,
        }
    }

    /// Catalog endpoint of a service in the session region, without the
    /// trailing project id some deployments register
    fn endpoint(&self, service_types: &[&str]) -> Option<Url> {
        let endpoint = self.catalog.endpoint(service_types, &self.region)?;
        Some(resources::strip_project_segment(&endpoint, &self.project_id))
    }
}

#[async_trait]
impl ProviderSession for OpenstackSession {
    fn current_project_id(&self) -> &str {
        &self.project_id
    }

    async fn project(&self) -> BackendResult<ProjectInfo> {
        tracing::info!("Retrieve current project data");
        self.fetcher().project(&self.identity_v3).await
    }

    async fn block_storage_service(&self) -> BackendResult<Option<BlockStorageService>> {
        let Some(endpoint) = self.endpoint(auth::BLOCK_STORAGE_TYPES) else {
            tracing::info!("No block storage service in region {}", self.region);
            return Ok(None);
        };

        let quota = self.fetcher().block_storage_quota(&endpoint).await?;
        Ok(Some(BlockStorageService {
            endpoint,
            name: ServiceName::Cinder,
            quotas: vec![quota],
        }))
    }

    async fn compute_service(&self, image_tags: &[String]) -> BackendResult<Option<ComputeService>> {
        let Some(endpoint) = self.endpoint(auth::COMPUTE_TYPES) else {
            tracing::info!("No compute service in region {}", self.region);
            return Ok(None);
        };

        let fetcher = self.fetcher();
        let images = async {
            match self.endpoint(auth::IMAGE_TYPES) {
                Some(image_endpoint) => fetcher.images(&image_endpoint, image_tags).await,
                None => {
                    tracing::info!("No image service in region {}", self.region);
                    Ok(Vec::new())
                }
            }
        };

        let (flavors, images, quota) = tokio::try_join!(
            fetcher.flavors(&endpoint),
            images,
            fetcher.compute_quota(&endpoint)
        )?;

        Ok(Some(ComputeService {
            endpoint,
            name: ServiceName::Nova,
            flavors,
            images,
            quotas: vec![quota],
        }))
    }

    async fn network_service(&self) -> BackendResult<Option<NetworkService>> {
        let Some(endpoint) = self.endpoint(auth::NETWORK_TYPES) else {
            tracing::info!("No network service in region {}", self.region);
            return Ok(None);
        };

        let quota = self.fetcher().network_quota(&endpoint).await?;
        Ok(Some(NetworkService {
            endpoint,
            name: ServiceName::Neutron,
            networks: Vec::new(),
            quotas: vec![quota],
        }))
    }

    async fn list_networks(&self, tags: &[String]) -> BackendResult<Vec<RawNetwork>> {
        match self.endpoint(auth::NETWORK_TYPES) {
            Some(endpoint) => self.fetcher().networks(&endpoint, tags).await,
            None => Ok(Vec::new()),
        }
    }
}
