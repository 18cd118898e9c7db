//! Site configuration loading
//!
//! Every `*.config.yaml` file of the providers directory describes one site:
//! the issuers trusted by the federation and the OpenStack / Kubernetes
//! providers to import. Documents are validated here once; the rest of the
//! run only sees valid, immutable [`SiteConfig`] values.

use crate::error::ValidationError;
use crate::model::{Issuer, Project, Provider, ProviderKind, ProviderStatus, Region, TrustedIdp};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use url::Url;
use uuid::Uuid;

/// Suffix identifying site documents in the providers directory
pub const CONFIG_FILE_SUFFIX: &str = ".config.yaml";

/// A validated site document
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// File the document was read from
    pub source: String,
    pub issuers: Vec<Issuer>,
    pub providers: Vec<Provider>,
}

#[derive(Debug, Deserialize)]
struct SiteDoc {
    trusted_idps: Vec<Issuer>,
    #[serde(default)]
    openstack: Vec<ProviderDoc>,
    #[serde(default)]
    kubernetes: Vec<ProviderDoc>,
}

#[derive(Debug, Deserialize)]
struct ProviderDoc {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    is_public: bool,
    #[serde(default)]
    support_emails: Vec<String>,
    auth_url: Url,
    #[serde(default)]
    identity_providers: Vec<TrustedIdp>,
    #[serde(default)]
    regions: Vec<Region>,
    #[serde(default)]
    projects: Vec<Project>,
    #[serde(default)]
    image_tags: Vec<String>,
    #[serde(default)]
    network_tags: Vec<String>,
}

/// Canonical hyphenated lowercase form of a UUID
fn normalize_uuid(value: &str) -> Option<String> {
    Uuid::parse_str(value.trim()).ok().map(|u| u.hyphenated().to_string())
}

/// First value appearing twice in `values`
fn first_duplicate<'a, I>(values: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    values.into_iter().find(|v| !seen.insert(*v))
}

fn validate_issuer(issuer: &mut Issuer) -> Result<(), ValidationError> {
    if issuer.user_groups.is_empty() {
        return Err(ValidationError::NoUserGroups {
            issuer: issuer.endpoint.to_string(),
        });
    }

    if let Some(name) = first_duplicate(issuer.user_groups.iter().map(|g| g.name.as_str())) {
        return Err(ValidationError::Duplicate {
            kind: "user group",
            value: name.to_string(),
            owner: format!("issuer {}", issuer.endpoint),
        });
    }

    for group in &mut issuer.user_groups {
        for sla in &mut group.slas {
            sla.doc_uuid =
                normalize_uuid(&sla.doc_uuid).ok_or_else(|| ValidationError::SlaDocUuid(sla.doc_uuid.clone()))?;

            if let Some(end) = sla.end_date {
                if end < sla.start_date {
                    return Err(ValidationError::SlaDates {
                        doc_uuid: sla.doc_uuid.clone(),
                        start: sla.start_date,
                        end,
                    });
                }
            }

            if let Some(project) = first_duplicate(sla.projects.iter().map(|p| p.as_str())) {
                return Err(ValidationError::Duplicate {
                    kind: "project",
                    value: project.to_string(),
                    owner: format!("SLA {}", sla.doc_uuid),
                });
            }
        }

        if let Some(doc_uuid) = first_duplicate(group.slas.iter().map(|s| s.doc_uuid.as_str())) {
            return Err(ValidationError::Duplicate {
                kind: "SLA",
                value: doc_uuid.to_string(),
                owner: format!("user group {}", group.name),
            });
        }
    }

    Ok(())
}

fn validate_provider(doc: ProviderDoc, kind: ProviderKind) -> Result<Provider, ValidationError> {
    let status = match doc.status.as_deref() {
        None => ProviderStatus::default(),
        Some(s) => ProviderStatus::parse(s).ok_or_else(|| ValidationError::Status {
            provider: doc.name.clone(),
            status: s.to_string(),
        })?,
    };

    if doc.identity_providers.is_empty() {
        return Err(ValidationError::NoTrustedIdps { provider: doc.name });
    }

    let owner = format!("provider {}", doc.name);
    if let Some(endpoint) = first_duplicate(doc.identity_providers.iter().map(|i| i.endpoint.as_str())) {
        return Err(ValidationError::Duplicate {
            kind: "identity provider",
            value: endpoint.to_string(),
            owner,
        });
    }

    let mut regions = doc.regions;
    if regions.is_empty() {
        regions.push(Region::named(kind.default_region()));
    }
    if let Some(region) = first_duplicate(regions.iter().map(|r| r.name.as_str())) {
        return Err(ValidationError::Duplicate {
            kind: "region",
            value: region.to_string(),
            owner,
        });
    }

    let mut projects = doc.projects;
    if let Some(project) = first_duplicate(projects.iter().map(|p| p.id.as_str())) {
        return Err(ValidationError::Duplicate {
            kind: "project",
            value: project.to_string(),
            owner,
        });
    }

    for project in &mut projects {
        if let Some(sla) = normalize_uuid(&project.sla) {
            project.sla = sla;
        }

        if let Some(region) = first_duplicate(project.per_region_props.iter().map(|p| p.region_name.as_str())) {
            return Err(ValidationError::Duplicate {
                kind: "region override",
                value: region.to_string(),
                owner: format!("project {}", project.id),
            });
        }

        if let Some(props) = project
            .per_region_props
            .iter()
            .find(|p| !regions.iter().any(|r| r.name == p.region_name))
        {
            return Err(ValidationError::UnknownRegion {
                provider: doc.name.clone(),
                project: project.id.clone(),
                region: props.region_name.clone(),
            });
        }
    }

    let kind = match kind {
        ProviderKind::Openstack { .. } => ProviderKind::Openstack {
            image_tags: doc.image_tags,
            network_tags: doc.network_tags,
        },
        ProviderKind::Kubernetes => ProviderKind::Kubernetes,
    };

    Ok(Provider {
        name: doc.name,
        description: doc.description,
        status,
        is_public: doc.is_public,
        support_emails: doc.support_emails,
        auth_url: doc.auth_url,
        identity_providers: doc.identity_providers,
        regions,
        projects,
        kind,
    })
}

/// Parse and validate one site document. Issuer tokens are left untouched.
pub fn parse_site(source: &str, content: &str) -> Result<SiteConfig, ValidationError> {
    let doc: SiteDoc = serde_yaml::from_str(content).map_err(|e| ValidationError::Parse {
        path: source.to_string(),
        source: e,
    })?;

    let mut issuers = doc.trusted_idps;
    for issuer in &mut issuers {
        validate_issuer(issuer)?;
    }
    if let Some(endpoint) = first_duplicate(issuers.iter().map(|i| i.endpoint.as_str())) {
        return Err(ValidationError::Duplicate {
            kind: "issuer",
            value: endpoint.to_string(),
            owner: source.to_string(),
        });
    }

    let openstack = doc.openstack.into_iter().map(|p| {
        validate_provider(
            p,
            ProviderKind::Openstack {
                image_tags: Vec::new(),
                network_tags: Vec::new(),
            },
        )
    });
    let kubernetes = doc
        .kubernetes
        .into_iter()
        .map(|p| validate_provider(p, ProviderKind::Kubernetes));
    let providers = openstack.chain(kubernetes).collect::<Result<Vec<_>, _>>()?;

    Ok(SiteConfig {
        source: source.to_string(),
        issuers,
        providers,
    })
}

/// Ask the oidc-agent container for an access token for `endpoint`
pub async fn oidc_agent_token(container: &str, endpoint: &Url) -> Result<String, ValidationError> {
    let token_error = |reason: String| ValidationError::Token {
        issuer: endpoint.to_string(),
        reason,
    };

    tracing::debug!("Requesting access token for {} from {}", endpoint, container);
    let output = Command::new("docker")
        .args(["exec", container, "oidc-token", endpoint.as_str()])
        .output()
        .await
        .map_err(|e| token_error(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let reason = if stderr.is_empty() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            stderr
        };
        return Err(token_error(reason));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(token_error("empty token".to_string()));
    }
    Ok(token)
}

/// Fill the missing issuer tokens of `site` through oidc-agent
pub async fn fill_tokens(site: &mut SiteConfig, container: &str) -> Result<(), ValidationError> {
    for issuer in site.issuers.iter_mut().filter(|i| i.token.is_empty()) {
        issuer.token = oidc_agent_token(container, &issuer.endpoint).await?;
    }
    Ok(())
}

/// Site documents of `dir`, sorted by file name
pub fn discover_config_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(CONFIG_FILE_SUFFIX))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

async fn load_site(path: &Path, oidc_agent_container: &str) -> Result<SiteConfig, ValidationError> {
    let source = path.display().to_string();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ValidationError::Read {
            path: source.clone(),
            source: e,
        })?;

    let mut site = parse_site(&source, &content)?;
    fill_tokens(&mut site, oidc_agent_container).await?;
    Ok(site)
}

/// Outcome of loading the providers directory
#[derive(Debug, Default)]
pub struct LoadedSites {
    pub sites: Vec<Arc<SiteConfig>>,
    /// Documents left out because they failed to load
    pub rejected: Vec<PathBuf>,
}

impl LoadedSites {
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Load every site document of `dir`. Invalid documents are logged and
/// reported in [`LoadedSites::rejected`]; only an unreadable directory fails.
pub async fn load_all(dir: &Path, oidc_agent_container: &str) -> Result<LoadedSites> {
    let files = discover_config_files(dir)?;
    tracing::info!("Found {} site configuration files in {}", files.len(), dir.display());

    let mut loaded = LoadedSites::default();
    for path in files {
        match load_site(&path, oidc_agent_container).await {
            Ok(site) => {
                tracing::info!(
                    "Loaded {}: {} issuers, {} providers",
                    site.source,
                    site.issuers.len(),
                    site.providers.len()
                );
                loaded.sites.push(Arc::new(site));
            }
            Err(e) => {
                tracing::error!("Rejecting {}: {}", path.display(), e);
                loaded.rejected.push(path);
            }
        }
    }
    Ok(loaded)
}
