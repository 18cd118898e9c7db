//! Per-project resource harvesting
//!
//! # Module Structure
//!
//! - [`network`] - Network visibility and default network rules
//!
//! [`harvest_project`] opens a project scoped session on one region of a
//! provider and collects everything the registry needs about that project.

pub mod network;

use crate::backend::{AuthContext, ProviderBackend, ProviderSession};
use crate::error::HarvestError;
use crate::model::{
    IdentityService, Limits, NetworkService, Project, ProjectRecord, Provider, ProviderKind, Region,
    ResolvedIdentity,
};
pub use network::{enrich_networks, is_default_network, NetworkRules};

/// Harvest one (provider, region, project) unit.
///
/// Services absent from the region catalog are simply omitted. A failure
/// while fetching any present service fails the whole unit.
pub async fn harvest_project(
    backend: &dyn ProviderBackend,
    site: &str,
    provider: &Provider,
    project: &Project,
    region: &Region,
    identity: ResolvedIdentity,
) -> Result<ProjectRecord, HarvestError> {
    if let ProviderKind::Kubernetes = provider.kind {
        return Err(HarvestError::Unsupported(provider.kind.as_str()));
    }

    let settings = project.settings_for_region(&region.name);

    let ctx = AuthContext {
        auth_url: provider.auth_url.clone(),
        idp_name: identity.relationship.idp_name.clone(),
        protocol: identity.relationship.protocol.clone(),
        token: identity.token.clone(),
        project_id: project.id.clone(),
        region_name: region.name.clone(),
    };
    let session = backend.connect(&ctx).await.map_err(HarvestError::Connection)?;
    let current_project = session.current_project_id().to_string();
    let rules = NetworkRules::new(provider.network_tags(), &settings);

    let (project_info, block_storage, compute, network) = tokio::try_join!(
        async {
            session
                .project()
                .await
                .map_err(|source| HarvestError::ServiceFetch { service: "identity", source })
        },
        async {
            session
                .block_storage_service()
                .await
                .map_err(|source| HarvestError::ServiceFetch {
                    service: "block storage",
                    source,
                })
        },
        async {
            session
                .compute_service(provider.image_tags())
                .await
                .map_err(|source| HarvestError::ServiceFetch { service: "compute", source })
        },
        network_service(session.as_ref(), provider, &rules),
    )?;

    let mut record = ProjectRecord {
        site: site.to_string(),
        provider: provider.name.clone(),
        region: region.name.clone(),
        identity,
        project: project_info,
        identity_service: IdentityService::keystone(provider.auth_url.clone()),
        block_storage_service: block_storage,
        compute_service: compute,
        network_service: network,
    };

    if let Some(limits) = settings.per_user_limits {
        append_per_user_limits(&mut record, limits, &current_project);
    }

    tracing::info!(
        "Harvested project {} on {}/{}",
        record.project.uuid,
        record.provider,
        record.region
    );
    Ok(record)
}

/// Network descriptor with its enriched networks
async fn network_service(
    session: &dyn ProviderSession,
    provider: &Provider,
    rules: &NetworkRules<'_>,
) -> Result<Option<NetworkService>, HarvestError> {
    let fetch_error = |source| HarvestError::ServiceFetch { service: "network", source };

    let Some(mut service) = session.network_service().await.map_err(fetch_error)? else {
        return Ok(None);
    };

    let raw = session.list_networks(provider.network_tags()).await.map_err(fetch_error)?;
    service.networks = enrich_networks(raw, rules, session.current_project_id());
    Ok(Some(service))
}

/// Add the per user limits as `per_user` quotas of the services present
fn append_per_user_limits(record: &mut ProjectRecord, limits: &Limits, project: &str) {
    if let (Some(service), Some(quota)) = (record.block_storage_service.as_mut(), &limits.block_storage) {
        let mut quota = quota.clone();
        quota.per_user = true;
        quota.project = project.to_string();
        service.quotas.push(quota);
    }
    if let (Some(service), Some(quota)) = (record.compute_service.as_mut(), &limits.compute) {
        let mut quota = quota.clone();
        quota.per_user = true;
        quota.project = project.to_string();
        service.quotas.push(quota);
    }
    if let (Some(service), Some(quota)) = (record.network_service.as_mut(), &limits.network) {
        let mut quota = quota.clone();
        quota.per_user = true;
        quota.project = project.to_string();
        service.quotas.push(quota);
    }
}
