//! Provider backends
//!
//! The harvester talks to providers only through [`ProviderBackend`] and
//! [`ProviderSession`], so the OpenStack REST implementation can be swapped
//! for an in-memory one in tests.
//!
//! # Module Structure
//!
//! - [`openstack`] - Keystone federated auth and Cinder/Nova/Glance/Neutron calls

pub mod openstack;

use crate::error::BackendResult;
use crate::model::{BlockStorageService, ComputeService, NetworkService, ProjectInfo};
use async_trait::async_trait;
use std::fmt;
use url::Url;

pub use openstack::OpenstackBackend;

/// Parameters used to open a project scoped session
#[derive(Clone)]
pub struct AuthContext {
    pub auth_url: Url,
    pub idp_name: String,
    pub protocol: String,
    pub token: String,
    pub project_id: String,
    pub region_name: String,
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("auth_url", &self.auth_url.as_str())
            .field("idp_name", &self.idp_name)
            .field("protocol", &self.protocol)
            .field("token", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("region_name", &self.region_name)
            .finish()
    }
}

/// Network as reported by the provider, before visibility rules are applied
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawNetwork {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub is_shared: bool,
    pub is_router_external: bool,
    pub is_default: bool,
    pub mtu: Option<u32>,
    pub tags: Vec<String>,
    pub project_id: Option<String>,
}

/// Entry point of a provider backend
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    /// Open a session scoped to `ctx.project_id` in `ctx.region_name`
    async fn connect(&self, ctx: &AuthContext) -> BackendResult<Box<dyn ProviderSession>>;
}

/// Project scoped session.
///
/// Service getters return `Ok(None)` when the service is not deployed in the
/// session region.
#[async_trait]
pub trait ProviderSession: Send + Sync {
    fn current_project_id(&self) -> &str;

    async fn project(&self) -> BackendResult<ProjectInfo>;

    /// Block storage endpoint and current project quotas
    async fn block_storage_service(&self) -> BackendResult<Option<BlockStorageService>>;

    /// Compute endpoint with flavors, images matching `image_tags` and
    /// current project quotas
    async fn compute_service(&self, image_tags: &[String]) -> BackendResult<Option<ComputeService>>;

    /// Network endpoint and current project quotas. Networks are listed
    /// separately through [`ProviderSession::list_networks`].
    async fn network_service(&self) -> BackendResult<Option<NetworkService>>;

    /// Networks visible to the session. `tags` may be used as a server side
    /// hint; callers still filter the result.
    async fn list_networks(&self, tags: &[String]) -> BackendResult<Vec<RawNetwork>>;
}
