//! Provider payload assembly
//!
//! Folds the per-project records of a run into one [`FederatedProvider`] per
//! configured provider. Records arrive in no particular order; they are
//! sorted first so the payload only depends on their content.

use crate::loader::SiteConfig;
use crate::model::{
    AuthMethod, BlockStorageService, ComputeService, IdentityService, Location, NetworkService, ProjectInfo,
    ProjectRecord, Provider, ProviderStatus, ScopedUserGroup,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use url::Url;

/// Issuer as published under a provider, with the user groups of every
/// imported project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityProviderEntry {
    pub endpoint: Url,
    pub group_claim: String,
    pub description: String,
    pub relationship: AuthMethod,
    pub user_groups: Vec<ScopedUserGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionEntry {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub identity_services: Vec<IdentityService>,
    pub block_storage_services: Vec<BlockStorageService>,
    pub compute_services: Vec<ComputeService>,
    pub network_services: Vec<NetworkService>,
}

/// Provider payload sent to the Federation Registry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FederatedProvider {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub provider_type: String,
    pub status: ProviderStatus,
    pub is_public: bool,
    pub support_emails: Vec<String>,
    pub identity_providers: Vec<IdentityProviderEntry>,
    pub projects: Vec<ProjectInfo>,
    pub regions: Vec<RegionEntry>,
}

impl FederatedProvider {
    /// Provider identity fields only
    fn shell(provider: &Provider) -> Self {
        Self {
            name: provider.name.clone(),
            description: provider.description.clone(),
            provider_type: provider.kind.as_str().to_string(),
            status: provider.status,
            is_public: provider.is_public,
            support_emails: provider.support_emails.clone(),
            identity_providers: Vec::new(),
            projects: Vec::new(),
            regions: Vec::new(),
        }
    }
}

fn push_unique_by<T, K, F>(target: &mut Vec<T>, items: Vec<T>, key: F)
where
    K: Eq + std::hash::Hash,
    F: Fn(&T) -> K,
{
    let mut seen: HashSet<K> = target.iter().map(&key).collect();
    for item in items {
        if seen.insert(key(&item)) {
            target.push(item);
        }
    }
}

fn merge_identity_provider(entries: &mut Vec<IdentityProviderEntry>, record: &ProjectRecord) {
    let identity = &record.identity;
    match entries.iter_mut().find(|e| e.endpoint == identity.endpoint) {
        Some(entry) => {
            if !entry.user_groups.contains(&identity.user_group) {
                entry.user_groups.push(identity.user_group.clone());
            }
        }
        None => entries.push(IdentityProviderEntry {
            endpoint: identity.endpoint.clone(),
            group_claim: identity.group_claim.clone(),
            description: identity.description.clone(),
            relationship: identity.relationship.clone(),
            user_groups: vec![identity.user_group.clone()],
        }),
    }
}

fn merge_services(region: &mut RegionEntry, record: ProjectRecord) {
    if !region
        .identity_services
        .iter()
        .any(|s| s.endpoint == record.identity_service.endpoint)
    {
        region.identity_services.push(record.identity_service);
    }

    if let Some(service) = record.block_storage_service {
        match region
            .block_storage_services
            .iter_mut()
            .find(|s| s.endpoint == service.endpoint)
        {
            Some(existing) => existing.quotas.extend(service.quotas),
            None => region.block_storage_services.push(service),
        }
    }

    if let Some(service) = record.compute_service {
        match region.compute_services.iter_mut().find(|s| s.endpoint == service.endpoint) {
            Some(existing) => {
                push_unique_by(&mut existing.flavors, service.flavors, |f| f.uuid.clone());
                push_unique_by(&mut existing.images, service.images, |i| i.uuid.clone());
                existing.quotas.extend(service.quotas);
            }
            None => region.compute_services.push(service),
        }
    }

    if let Some(service) = record.network_service {
        match region.network_services.iter_mut().find(|s| s.endpoint == service.endpoint) {
            Some(existing) => {
                push_unique_by(&mut existing.networks, service.networks, |n| n.uuid.clone());
                existing.quotas.extend(service.quotas);
            }
            None => region.network_services.push(service),
        }
    }
}

/// Keep in flavor and image project lists only the imported projects
fn restrict_to_imported(provider: &mut FederatedProvider) {
    let imported: HashSet<&str> = provider.projects.iter().map(|p| p.uuid.as_str()).collect();
    for region in &mut provider.regions {
        for service in &mut region.compute_services {
            for flavor in &mut service.flavors {
                flavor.projects.retain(|p| imported.contains(p.as_str()));
            }
            for image in &mut service.images {
                image.projects.retain(|p| imported.contains(p.as_str()));
            }
        }
    }
}

fn build_provider(provider: &Provider, mut records: Vec<ProjectRecord>) -> FederatedProvider {
    let mut payload = FederatedProvider::shell(provider);
    if !provider.is_active() {
        tracing::info!("Provider {} not active: {}", provider.name, provider.status.as_str());
        return payload;
    }

    records.sort_by(|a, b| (&a.region, &a.project.uuid).cmp(&(&b.region, &b.project.uuid)));

    payload.regions = provider
        .regions
        .iter()
        .map(|r| RegionEntry {
            name: r.name.clone(),
            description: r.description.clone(),
            location: r.location.clone(),
            identity_services: Vec::new(),
            block_storage_services: Vec::new(),
            compute_services: Vec::new(),
            network_services: Vec::new(),
        })
        .collect();

    for record in records {
        merge_identity_provider(&mut payload.identity_providers, &record);
        if !payload.projects.iter().any(|p| p.uuid == record.project.uuid) {
            payload.projects.push(record.project.clone());
        }
        match payload.regions.iter_mut().find(|r| r.name == record.region) {
            Some(region) => merge_services(region, record),
            None => tracing::warn!(
                "Dropping record of project {}: region {} is not declared by {}",
                record.project.uuid,
                record.region,
                provider.name
            ),
        }
    }

    restrict_to_imported(&mut payload);
    payload
}

/// One payload per configured provider. Inactive providers only carry their
/// identity fields. When several sites declare the same provider name the
/// first declaration wins and records of the other declarations are dropped.
pub fn assemble(sites: &[Arc<SiteConfig>], records: Vec<ProjectRecord>) -> Vec<FederatedProvider> {
    let mut by_provider: HashMap<(String, String), Vec<ProjectRecord>> = HashMap::new();
    for record in records {
        by_provider
            .entry((record.site.clone(), record.provider.clone()))
            .or_default()
            .push(record);
    }

    let mut seen = HashSet::new();
    let mut providers = Vec::new();
    for site in sites {
        for provider in &site.providers {
            if !seen.insert(provider.name.as_str()) {
                tracing::warn!(
                    "Provider {} declared again in {}, ignoring this declaration",
                    provider.name,
                    site.source
                );
                continue;
            }
            let key = (site.source.clone(), provider.name.clone());
            let records = by_provider.remove(&key).unwrap_or_default();
            providers.push(build_provider(provider, records));
        }
    }
    providers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Flavor, Image, Network, ProviderKind, Region, ResolvedIdentity, ScopedSla, ServiceName, TrustedIdp,
    };
    use chrono::NaiveDate;

    fn provider(status: ProviderStatus) -> Provider {
        Provider {
            name: "cloud".to_string(),
            description: String::new(),
            status,
            is_public: false,
            support_emails: vec!["ops@example.org".to_string()],
            auth_url: Url::parse("https://keystone.example.org/v3").unwrap(),
            identity_providers: vec![TrustedIdp {
                endpoint: Url::parse("https://iam.example.org").unwrap(),
                idp_name: "egi".to_string(),
                protocol: "openid".to_string(),
            }],
            regions: vec![Region::named("RegionOne"), Region::named("RegionTwo")],
            projects: vec![],
            kind: ProviderKind::Openstack {
                image_tags: vec![],
                network_tags: vec![],
            },
        }
    }

    fn site(provider: Provider) -> Arc<SiteConfig> {
        site_from("site.config.yaml", provider)
    }

    fn site_from(source: &str, provider: Provider) -> Arc<SiteConfig> {
        Arc::new(SiteConfig {
            source: source.to_string(),
            issuers: vec![],
            providers: vec![provider],
        })
    }

    fn flavor(uuid: &str, projects: &[&str]) -> Flavor {
        Flavor {
            uuid: uuid.to_string(),
            name: uuid.to_string(),
            description: String::new(),
            disk: 0,
            ram: 0,
            vcpus: 1,
            swap: 0,
            ephemeral: 0,
            is_public: projects.is_empty(),
            gpus: 0,
            gpu_model: None,
            gpu_vendor: None,
            local_storage: None,
            infiniband: false,
            projects: projects.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn image(uuid: &str, projects: &[&str]) -> Image {
        Image {
            uuid: uuid.to_string(),
            name: uuid.to_string(),
            description: String::new(),
            os_type: None,
            os_distro: None,
            os_version: None,
            architecture: None,
            kernel_id: None,
            cuda_support: false,
            gpu_driver: false,
            tags: vec![],
            is_public: projects.is_empty(),
            projects: projects.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn network(uuid: &str) -> Network {
        Network {
            uuid: uuid.to_string(),
            name: uuid.to_string(),
            description: String::new(),
            status: "ACTIVE".to_string(),
            is_shared: true,
            is_router_external: false,
            is_default: false,
            mtu: None,
            tags: vec![],
            project: None,
            proxy_ip: None,
            proxy_user: None,
        }
    }

    fn record(region: &str, project: &str, flavors: Vec<Flavor>, images: Vec<Image>) -> ProjectRecord {
        let compute = ComputeService {
            endpoint: Url::parse(&format!("https://nova.{}.example.org/v2.1", region.to_lowercase())).unwrap(),
            name: ServiceName::Nova,
            flavors,
            images,
            quotas: vec![crate::model::ComputeQuota {
                cores: Some(10),
                project: project.to_string(),
                ..Default::default()
            }],
        };
        ProjectRecord {
            site: "site.config.yaml".to_string(),
            provider: "cloud".to_string(),
            region: region.to_string(),
            identity: ResolvedIdentity {
                endpoint: Url::parse("https://iam.example.org").unwrap(),
                group_claim: "groups".to_string(),
                description: String::new(),
                relationship: AuthMethod {
                    idp_name: "egi".to_string(),
                    protocol: "openid".to_string(),
                },
                token: "secret".to_string(),
                user_group: ScopedUserGroup {
                    name: "admins".to_string(),
                    description: String::new(),
                    sla: ScopedSla {
                        doc_uuid: "sla".to_string(),
                        start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                        end_date: None,
                        project: project.to_string(),
                    },
                },
            },
            project: ProjectInfo {
                uuid: project.to_string(),
                name: project.to_string(),
                description: String::new(),
            },
            identity_service: IdentityService::keystone(Url::parse("https://keystone.example.org/v3").unwrap()),
            block_storage_service: None,
            compute_service: Some(compute),
            network_service: Some(NetworkService {
                endpoint: Url::parse("https://neutron.example.org").unwrap(),
                name: ServiceName::Neutron,
                networks: vec![network("shared-net")],
                quotas: vec![],
            }),
        }
    }

    #[test]
    fn test_inactive_provider_is_published_empty() {
        let sites = vec![site(provider(ProviderStatus::Maintenance))];
        let out = assemble(&sites, vec![record("RegionOne", "p1", vec![], vec![])]);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].status, ProviderStatus::Maintenance);
        assert!(out[0].regions.is_empty());
        assert!(out[0].projects.is_empty());
        assert!(out[0].identity_providers.is_empty());
    }

    #[test]
    fn test_records_merged_per_region_and_endpoint() {
        let sites = vec![site(provider(ProviderStatus::Active))];
        let records = vec![
            record("RegionOne", "p2", vec![flavor("f1", &[]), flavor("f2", &[])], vec![]),
            record("RegionOne", "p1", vec![flavor("f1", &[])], vec![image("i1", &[])]),
            record("RegionTwo", "p1", vec![flavor("f3", &[])], vec![]),
        ];

        let out = assemble(&sites, records);
        let provider = &out[0];

        let uuids: Vec<_> = provider.projects.iter().map(|p| p.uuid.as_str()).collect();
        assert_eq!(uuids, vec!["p1", "p2"]);

        assert_eq!(provider.regions.len(), 2);
        let region_one = &provider.regions[0];
        assert_eq!(region_one.identity_services.len(), 1);
        assert_eq!(region_one.compute_services.len(), 1);
        let compute = &region_one.compute_services[0];
        let flavors: Vec<_> = compute.flavors.iter().map(|f| f.uuid.as_str()).collect();
        assert_eq!(flavors, vec!["f1", "f2"]);
        assert_eq!(compute.images.len(), 1);
        assert_eq!(compute.quotas.len(), 2);

        assert_eq!(region_one.network_services.len(), 1);
        assert_eq!(region_one.network_services[0].networks.len(), 1);

        let idps = &provider.identity_providers;
        assert_eq!(idps.len(), 1);
        assert_eq!(idps[0].user_groups.len(), 2);
    }

    #[test]
    fn test_private_resources_restricted_to_imported_projects() {
        let sites = vec![site(provider(ProviderStatus::Active))];
        let records = vec![record(
            "RegionOne",
            "p1",
            vec![flavor("f1", &["p1", "foreign"])],
            vec![image("i1", &["foreign", "p1"])],
        )];

        let out = assemble(&sites, records);
        let compute = &out[0].regions[0].compute_services[0];

        assert_eq!(compute.flavors[0].projects, vec!["p1"]);
        assert_eq!(compute.images[0].projects, vec!["p1"]);
    }

    #[test]
    fn test_provider_without_records_keeps_declared_regions() {
        let sites = vec![site(provider(ProviderStatus::Active))];
        let out = assemble(&sites, vec![]);

        assert_eq!(out[0].regions.len(), 2);
        assert!(out[0].regions[0].compute_services.is_empty());
    }

    #[test]
    fn test_duplicate_provider_keeps_first_declaration() {
        let mut second = provider(ProviderStatus::Active);
        second.description = "second declaration".to_string();
        let sites = vec![site_from("a.config.yaml", provider(ProviderStatus::Active)), site_from("b.config.yaml", second)];

        let mut first_record = record("RegionOne", "p1", vec![], vec![]);
        first_record.site = "a.config.yaml".to_string();
        let mut second_record = record("RegionOne", "p2", vec![], vec![]);
        second_record.site = "b.config.yaml".to_string();

        let out = assemble(&sites, vec![first_record, second_record]);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].description, "");
        let uuids: Vec<_> = out[0].projects.iter().map(|p| p.uuid.as_str()).collect();
        assert_eq!(uuids, vec!["p1"]);
    }

    #[test]
    fn test_payload_never_contains_tokens() {
        let sites = vec![site(provider(ProviderStatus::Active))];
        let out = assemble(&sites, vec![record("RegionOne", "p1", vec![], vec![])]);

        let json = serde_json::to_string(&out).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"type\":\"openstack\""));
    }
}
