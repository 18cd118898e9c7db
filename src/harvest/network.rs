//! Network enrichment
//!
//! Turns the raw networks listed by a provider into the descriptors
//! published for one project: inactive networks, networks outside the tag
//! filter and private networks of other projects are dropped; the default
//! flag, owning project and proxy are filled in.

use crate::backend::RawNetwork;
use crate::model::{Network, PrivateNetProxy, RegionSettings};

/// Per project rules applied to every listed network
#[derive(Debug, Clone, Default)]
pub struct NetworkRules<'a> {
    /// Keep only networks carrying at least one of these tags. Empty keeps all.
    pub tags: &'a [String],
    pub default_private_net: Option<&'a str>,
    pub default_public_net: Option<&'a str>,
    pub proxy: Option<&'a PrivateNetProxy>,
}

impl<'a> NetworkRules<'a> {
    pub fn new(tags: &'a [String], settings: &RegionSettings<'a>) -> Self {
        Self {
            tags,
            default_private_net: settings.default_private_net,
            default_public_net: settings.default_public_net,
            proxy: settings.private_net_proxy,
        }
    }
}

/// Whether `network` is the default one for the project
pub fn is_default_network(network: &RawNetwork, rules: &NetworkRules<'_>) -> bool {
    if network.is_default {
        return true;
    }
    let configured = if network.is_shared {
        rules.default_public_net
    } else {
        rules.default_private_net
    };
    configured == Some(network.name.as_str())
}

fn matches_tags(network: &RawNetwork, tags: &[String]) -> bool {
    tags.is_empty() || network.tags.iter().any(|t| tags.contains(t))
}

/// Apply `rules` to the networks visible from `current_project`.
/// Output keeps the input order.
pub fn enrich_networks(raw: Vec<RawNetwork>, rules: &NetworkRules<'_>, current_project: &str) -> Vec<Network> {
    raw.into_iter()
        .filter_map(|network| {
            if !network.status.eq_ignore_ascii_case("active") {
                tracing::debug!("Skipping network {}: status {}", network.id, network.status);
                return None;
            }
            if !matches_tags(&network, rules.tags) {
                tracing::debug!("Skipping network {}: no matching tag", network.id);
                return None;
            }

            let project = if network.is_shared {
                None
            } else if network.project_id.as_deref() == Some(current_project) {
                Some(current_project.to_string())
            } else {
                tracing::debug!("Skipping network {}: owned by another project", network.id);
                return None;
            };

            let is_default = is_default_network(&network, rules);
            Some(Network {
                uuid: network.id,
                name: network.name,
                description: network.description.unwrap_or_default(),
                status: network.status,
                is_shared: network.is_shared,
                is_router_external: network.is_router_external,
                is_default,
                mtu: network.mtu,
                tags: network.tags,
                project,
                proxy_ip: rules.proxy.map(|p| p.ip),
                proxy_user: rules.proxy.map(|p| p.user.clone()),
            })
        })
        .collect()
}
