//! Harvested resources
//!
//! Service descriptors and the resources attached to them, in the shape the
//! Federation Registry expects.

use super::identity::ResolvedIdentity;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use url::Url;

/// Registry name of a harvested service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceName {
    #[serde(rename = "org.openstack.keystone")]
    Keystone,
    #[serde(rename = "org.openstack.cinder")]
    Cinder,
    #[serde(rename = "org.openstack.nova")]
    Nova,
    #[serde(rename = "org.openstack.neutron")]
    Neutron,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStorageQuota {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gigabytes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_volume_gigabytes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<i64>,
    #[serde(default)]
    pub per_user: bool,
    #[serde(default)]
    pub project: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeQuota {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram: Option<i64>,
    #[serde(default)]
    pub per_user: bool,
    #[serde(default)]
    pub project: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkQuota {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networks: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ips: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_groups: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_group_rules: Option<i64>,
    #[serde(default)]
    pub per_user: bool,
    #[serde(default)]
    pub project: String,
}

/// Network visible from a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Network {
    pub uuid: String,
    pub name: String,
    pub description: String,
    pub status: String,
    pub is_shared: bool,
    pub is_router_external: bool,
    pub is_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    pub tags: Vec<String>,
    /// Owning project. Always empty for shared networks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_ip: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flavor {
    pub uuid: String,
    pub name: String,
    pub description: String,
    pub disk: u64,
    pub ram: u64,
    pub vcpus: u32,
    pub swap: u64,
    pub ephemeral: u64,
    pub is_public: bool,
    pub gpus: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_storage: Option<String>,
    pub infiniband: bool,
    /// Projects granted access to a private flavor
    pub projects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    pub uuid: String,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_distro: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel_id: Option<String>,
    pub cuda_support: bool,
    pub gpu_driver: bool,
    pub tags: Vec<String>,
    pub is_public: bool,
    /// Owner and accepted members of a private or shared image
    pub projects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectInfo {
    pub uuid: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityService {
    pub endpoint: Url,
    pub name: ServiceName,
}

impl IdentityService {
    pub fn keystone(endpoint: Url) -> Self {
        Self {
            endpoint,
            name: ServiceName::Keystone,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockStorageService {
    pub endpoint: Url,
    pub name: ServiceName,
    pub quotas: Vec<BlockStorageQuota>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComputeService {
    pub endpoint: Url,
    pub name: ServiceName,
    pub flavors: Vec<Flavor>,
    pub images: Vec<Image>,
    pub quotas: Vec<ComputeQuota>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkService {
    pub endpoint: Url,
    pub name: ServiceName,
    pub networks: Vec<Network>,
    pub quotas: Vec<NetworkQuota>,
}

/// Output of one successful harvest: a project seen from one region of one
/// provider
#[derive(Debug, Clone)]
pub struct ProjectRecord {
    /// Site document declaring the provider
    pub site: String,
    pub provider: String,
    pub region: String,
    pub identity: ResolvedIdentity,
    pub project: ProjectInfo,
    pub identity_service: IdentityService,
    pub block_storage_service: Option<BlockStorageService>,
    pub compute_service: Option<ComputeService>,
    pub network_service: Option<NetworkService>,
}
