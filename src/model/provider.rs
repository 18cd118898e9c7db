//! Provider configuration
//!
//! Providers, their projects and regions, and the identity providers each
//! one trusts for authentication.

use super::identity::AuthMethod;
use super::resources::{BlockStorageQuota, ComputeQuota, NetworkQuota};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use url::Url;

/// Lifecycle status of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    #[default]
    Active,
    Maintenance,
    Limited,
    Deprecated,
}

impl ProviderStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "maintenance" => Some(Self::Maintenance),
            "limited" => Some(Self::Limited),
            "deprecated" => Some(Self::Deprecated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Maintenance => "maintenance",
            Self::Limited => "limited",
            Self::Deprecated => "deprecated",
        }
    }
}

/// Provider flavour, carrying only the fields that apply to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    Openstack {
        /// Only images carrying these tags are imported
        image_tags: Vec<String>,
        /// Only networks carrying at least one of these tags are imported
        network_tags: Vec<String>,
    },
    Kubernetes,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openstack { .. } => "openstack",
            Self::Kubernetes => "kubernetes",
        }
    }

    /// Region used when the configuration declares none
    pub fn default_region(&self) -> &'static str {
        match self {
            Self::Openstack { .. } => "RegionOne",
            Self::Kubernetes => "default",
        }
    }
}

/// A validated provider definition
#[derive(Debug, Clone)]
pub struct Provider {
    pub name: String,
    pub description: String,
    pub status: ProviderStatus,
    pub is_public: bool,
    pub support_emails: Vec<String>,
    /// Identity service endpoint
    pub auth_url: Url,
    /// Identity providers this provider accepts tokens from
    pub identity_providers: Vec<TrustedIdp>,
    pub regions: Vec<Region>,
    pub projects: Vec<Project>,
    pub kind: ProviderKind,
}

impl Provider {
    pub fn is_active(&self) -> bool {
        self.status == ProviderStatus::Active
    }

    pub fn image_tags(&self) -> &[String] {
        match &self.kind {
            ProviderKind::Openstack { image_tags, .. } => image_tags,
            ProviderKind::Kubernetes => &[],
        }
    }

    pub fn network_tags(&self) -> &[String] {
        match &self.kind {
            ProviderKind::Openstack { network_tags, .. } => network_tags,
            ProviderKind::Kubernetes => &[],
        }
    }

    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }
}

/// Trust relationship declared by a provider: tokens issued by `endpoint`
/// are accepted through the (`idp_name`, `protocol`) auth method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedIdp {
    pub endpoint: Url,
    #[serde(alias = "name")]
    pub idp_name: String,
    pub protocol: String,
}

impl TrustedIdp {
    pub fn auth_method(&self) -> AuthMethod {
        AuthMethod {
            idp_name: self.idp_name.clone(),
            protocol: self.protocol.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub site: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Region {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            location: None,
        }
    }
}

/// Proxy to use to reach machines attached to private networks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateNetProxy {
    pub ip: IpAddr,
    pub user: String,
}

/// Quotas applying to each user of a project
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Limits {
    #[serde(default)]
    pub block_storage: Option<BlockStorageQuota>,
    #[serde(default)]
    pub compute: Option<ComputeQuota>,
    #[serde(default)]
    pub network: Option<NetworkQuota>,
}

/// Region specific overrides of the project settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PerRegionProps {
    pub region_name: String,
    #[serde(default)]
    pub default_public_net: Option<String>,
    #[serde(default)]
    pub default_private_net: Option<String>,
    #[serde(default)]
    pub private_net_proxy: Option<PrivateNetProxy>,
    #[serde(default)]
    pub per_user_limits: Option<Limits>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Project {
    /// Project unique ID or name
    pub id: String,
    /// SLA document uuid
    pub sla: String,
    #[serde(default)]
    pub default_public_net: Option<String>,
    #[serde(default)]
    pub default_private_net: Option<String>,
    #[serde(default)]
    pub private_net_proxy: Option<PrivateNetProxy>,
    #[serde(default)]
    pub per_user_limits: Option<Limits>,
    #[serde(default)]
    pub per_region_props: Vec<PerRegionProps>,
}

/// Effective project settings inside one region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionSettings<'a> {
    pub default_public_net: Option<&'a str>,
    pub default_private_net: Option<&'a str>,
    pub private_net_proxy: Option<&'a PrivateNetProxy>,
    pub per_user_limits: Option<&'a Limits>,
}

impl Project {
    /// Settings for `region`. A matching [`PerRegionProps`] entry replaces the
    /// project level values as a whole, unset fields included.
    pub fn settings_for_region(&self, region: &str) -> RegionSettings<'_> {
        match self.per_region_props.iter().find(|p| p.region_name == region) {
            Some(props) => RegionSettings {
                default_public_net: props.default_public_net.as_deref(),
                default_private_net: props.default_private_net.as_deref(),
                private_net_proxy: props.private_net_proxy.as_ref(),
                per_user_limits: props.per_user_limits.as_ref(),
            },
            None => RegionSettings {
                default_public_net: self.default_public_net.as_deref(),
                default_private_net: self.default_private_net.as_deref(),
                private_net_proxy: self.private_net_proxy.as_ref(),
                per_user_limits: self.per_user_limits.as_ref(),
            },
        }
    }
}
