//! OpenStack resource listing
//!
//! JSON parsers for Keystone, Cinder, Nova, Glance and Neutron responses and
//! the calls that fetch them. Parsers are lenient: missing optional fields
//! take their registry default, malformed entries are skipped.

use super::http::{self, OpenstackHttp};
use crate::backend::RawNetwork;
use crate::error::{BackendError, BackendResult};
use crate::model::{BlockStorageQuota, ComputeQuota, Flavor, Image, NetworkQuota, ProjectInfo};
use futures::{stream, StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use url::Url;

/// Nova microversion exposing flavor descriptions and extra specs
const COMPUTE_HEADERS: &[(&str, &str)] = &[
    ("OpenStack-API-Version", "compute 2.61"),
    ("X-OpenStack-Nova-API-Version", "2.61"),
];

/// Parallel flavor access / image member lookups per service
const DETAIL_CONCURRENCY: usize = 4;

/// Safety net against a `next` link that never ends
const MAX_PAGES: usize = 100;

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn int_field(value: &Value, key: &str) -> Option<i64> {
    value.get(key).and_then(|v| v.as_i64())
}

/// Integer that some deployments send as a string (`""` meaning zero)
fn lenient_u64(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Boolean that image properties and extra specs often carry as a string
fn lenient_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().map(|n| n != 0).unwrap_or(false),
        Some(Value::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    }
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Drop a trailing project id from a catalog endpoint
/// (`https://cinder:8776/v3/<project>` becomes `https://cinder:8776/v3`)
pub fn strip_project_segment(endpoint: &Url, project_id: &str) -> Url {
    let mut url = endpoint.clone();
    let ends_with_project = endpoint
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(|last| last == project_id)
        .unwrap_or(false);

    if ends_with_project {
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().pop();
        }
    }
    url
}

/// Glance root from its catalog endpoint, which may already carry `/v2`
pub fn image_root(endpoint: &Url) -> Url {
    let mut url = endpoint.clone();
    let ends_with_version = endpoint
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(|last| last == "v2")
        .unwrap_or(false);

    if ends_with_version {
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().pop();
        }
    }
    url
}

/// Resolve a Glance `next` link (`/v2/images?marker=...`) against its root
pub fn resolve_next(root: &Url, next: &str) -> BackendResult<Url> {
    let (path, query) = match next.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (next, None),
    };
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut url = http::with_segments(root, &segments)?;
    url.set_query(query);
    Ok(url)
}

/// `href` of the `rel: next` entry of a Neutron `<resource>_links` list
pub fn next_link<'v>(body: &'v Value, links_key: &str) -> Option<&'v str> {
    body.get(links_key)?
        .as_array()?
        .iter()
        .find(|link| link.get("rel").and_then(|r| r.as_str()) == Some("next"))
        .and_then(|link| link.get("href"))
        .and_then(|href| href.as_str())
}

// =============================================================================
// Parsers
// =============================================================================

pub fn parse_project(body: &Value) -> Option<ProjectInfo> {
    let project = body.get("project")?;
    Some(ProjectInfo {
        uuid: str_field(project, "id")?,
        name: str_field(project, "name").unwrap_or_default(),
        description: str_field(project, "description").unwrap_or_default(),
    })
}

pub fn parse_block_storage_quota(body: &Value, project: &str) -> BlockStorageQuota {
    let quota = body.get("quota_set").unwrap_or(&Value::Null);
    BlockStorageQuota {
        gigabytes: int_field(quota, "gigabytes"),
        per_volume_gigabytes: int_field(quota, "per_volume_gigabytes"),
        volumes: int_field(quota, "volumes"),
        per_user: false,
        project: project.to_string(),
    }
}

pub fn parse_compute_quota(body: &Value, project: &str) -> ComputeQuota {
    let quota = body.get("quota_set").unwrap_or(&Value::Null);
    ComputeQuota {
        cores: int_field(quota, "cores"),
        instances: int_field(quota, "instances"),
        ram: int_field(quota, "ram"),
        per_user: false,
        project: project.to_string(),
    }
}

pub fn parse_network_quota(body: &Value, project: &str) -> NetworkQuota {
    let quota = body.get("quota").unwrap_or(&Value::Null);
    NetworkQuota {
        networks: int_field(quota, "network"),
        ports: int_field(quota, "port"),
        public_ips: int_field(quota, "floatingip"),
        security_groups: int_field(quota, "security_group"),
        security_group_rules: int_field(quota, "security_group_rule"),
        per_user: false,
        project: project.to_string(),
    }
}

pub fn parse_network(value: &Value) -> Option<RawNetwork> {
    Some(RawNetwork {
        id: str_field(value, "id")?,
        name: str_field(value, "name").unwrap_or_default(),
        description: str_field(value, "description"),
        status: str_field(value, "status").unwrap_or_default(),
        is_shared: lenient_bool(value.get("shared")),
        is_router_external: lenient_bool(value.get("router:external")),
        is_default: lenient_bool(value.get("is_default")),
        mtu: value.get("mtu").and_then(|v| v.as_u64()).and_then(|v| u32::try_from(v).ok()),
        tags: string_list(value, "tags"),
        project_id: str_field(value, "project_id").or_else(|| str_field(value, "tenant_id")),
    })
}

/// Parse a Nova flavor. Returns `None` for disabled or malformed flavors.
/// `projects` is only meaningful for private flavors.
pub fn parse_flavor(value: &Value, projects: Vec<String>) -> Option<Flavor> {
    if lenient_bool(value.get("OS-FLV-DISABLED:disabled")) {
        return None;
    }

    let empty = Map::new();
    let extra = value
        .get("extra_specs")
        .and_then(|v| v.as_object())
        .unwrap_or(&empty);

    let gpus = u32::try_from(lenient_u64(extra.get("gpu_number"))).unwrap_or(0);
    let gpu_spec = |key: &str| {
        if gpus > 0 {
            extra.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
        } else {
            None
        }
    };

    let is_public = value
        .get("os-flavor-access:is_public")
        .or_else(|| value.get("is_public"))
        .map(|v| lenient_bool(Some(v)))
        .unwrap_or(true);

    Some(Flavor {
        uuid: str_field(value, "id")?,
        name: str_field(value, "name").unwrap_or_default(),
        description: str_field(value, "description").unwrap_or_default(),
        disk: lenient_u64(value.get("disk")),
        ram: lenient_u64(value.get("ram")),
        vcpus: u32::try_from(lenient_u64(value.get("vcpus"))).unwrap_or(0),
        swap: lenient_u64(value.get("swap")),
        ephemeral: lenient_u64(value.get("OS-FLV-EXT-DATA:ephemeral")),
        is_public,
        gpus,
        gpu_model: gpu_spec("gpu_model"),
        gpu_vendor: gpu_spec("gpu_vendor"),
        local_storage: extra
            .get("aggregate_instance_extra_specs:local_storage")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        infiniband: lenient_bool(extra.get("infiniband")),
        projects: if is_public { Vec::new() } else { projects },
    })
}

/// Visibility of a Glance image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageVisibility {
    Public,
    Community,
    Private,
    Shared,
}

impl ImageVisibility {
    pub fn from_str(s: &str) -> Self {
        match s {
            "private" => ImageVisibility::Private,
            "shared" => ImageVisibility::Shared,
            "community" => ImageVisibility::Community,
            _ => ImageVisibility::Public,
        }
    }

    pub fn is_public(self) -> bool {
        matches!(self, ImageVisibility::Public | ImageVisibility::Community)
    }
}

pub fn image_visibility(value: &Value) -> ImageVisibility {
    value
        .get("visibility")
        .and_then(|v| v.as_str())
        .map(ImageVisibility::from_str)
        .unwrap_or(ImageVisibility::Public)
}

/// Parse a Glance image. `members` are the accepted members of a shared
/// image; the owner is always listed first for non public images.
pub fn parse_image(value: &Value, members: Vec<String>) -> Option<Image> {
    let visibility = image_visibility(value);
    let projects = if visibility.is_public() {
        Vec::new()
    } else {
        let mut projects: Vec<String> = str_field(value, "owner").into_iter().collect();
        if visibility == ImageVisibility::Shared {
            for member in members {
                if !projects.contains(&member) {
                    projects.push(member);
                }
            }
        }
        projects
    };

    Some(Image {
        uuid: str_field(value, "id")?,
        name: str_field(value, "name").unwrap_or_default(),
        description: str_field(value, "description").unwrap_or_default(),
        os_type: str_field(value, "os_type"),
        os_distro: str_field(value, "os_distro"),
        os_version: str_field(value, "os_version"),
        architecture: str_field(value, "architecture"),
        kernel_id: str_field(value, "kernel_id"),
        cuda_support: lenient_bool(value.get("cuda_support")),
        gpu_driver: lenient_bool(value.get("gpu_driver")),
        tags: string_list(value, "tags"),
        is_public: visibility.is_public(),
        projects,
    })
}

/// Ids of the accepted members of an image
pub fn accepted_members(body: &Value) -> Vec<String> {
    body.get("members")
        .and_then(|v| v.as_array())
        .map(|members| {
            members
                .iter()
                .filter(|m| m.get("status").and_then(|s| s.as_str()) == Some("accepted"))
                .filter_map(|m| str_field(m, "member_id"))
                .collect()
        })
        .unwrap_or_default()
}

/// Tenant ids listed in a flavor access response
pub fn flavor_access_projects(body: &Value) -> Vec<String> {
    let mut projects: Vec<String> = Vec::new();
    if let Some(entries) = body.get("flavor_access").and_then(|v| v.as_array()) {
        for tenant in entries.iter().filter_map(|e| str_field(e, "tenant_id")) {
            if !projects.contains(&tenant) {
                projects.push(tenant);
            }
        }
    }
    projects
}

// =============================================================================
// Fetchers
// =============================================================================

/// Authenticated view on the REST APIs of one project
pub struct ResourceFetcher<'a> {
    pub http: &'a OpenstackHttp,
    pub token: &'a str,
    pub project_id: &'a str,
}

impl<'a> ResourceFetcher<'a> {
    async fn get(&self, url: &Url) -> BackendResult<Value> {
        self.http.get(url, self.token, &[]).await
    }

    async fn get_compute(&self, url: &Url) -> BackendResult<Value> {
        self.http.get(url, self.token, COMPUTE_HEADERS).await
    }

    pub async fn project(&self, identity_v3: &Url) -> BackendResult<ProjectInfo> {
        let url = http::with_segments(identity_v3, &["projects", self.project_id])?;
        let body = self.get(&url).await?;
        parse_project(&body).ok_or_else(|| BackendError::Decode {
            url: url.to_string(),
            reason: "missing project".to_string(),
        })
    }

    pub async fn block_storage_quota(&self, endpoint: &Url) -> BackendResult<BlockStorageQuota> {
        tracing::info!("Retrieve current project accessible block storage quotas");
        let url = http::with_segments(endpoint, &["os-quota-sets", self.project_id])?;
        let body = self.get(&url).await?;
        Ok(parse_block_storage_quota(&body, self.project_id))
    }

    pub async fn compute_quota(&self, endpoint: &Url) -> BackendResult<ComputeQuota> {
        tracing::info!("Retrieve current project accessible compute quotas");
        let url = http::with_segments(endpoint, &["os-quota-sets", self.project_id])?;
        let body = self.get_compute(&url).await?;
        Ok(parse_compute_quota(&body, self.project_id))
    }

    pub async fn network_quota(&self, endpoint: &Url) -> BackendResult<NetworkQuota> {
        tracing::info!("Retrieve current project accessible network quotas");
        let base = http::versioned(endpoint, "v2.0")?;
        let url = http::with_segments(&base, &["quotas", self.project_id])?;
        let body = self.get(&url).await?;
        Ok(parse_network_quota(&body, self.project_id))
    }

    /// Enabled flavors, with the projects granted access to private ones
    pub async fn flavors(&self, endpoint: &Url) -> BackendResult<Vec<Flavor>> {
        tracing::info!("Retrieve current project accessible flavors");
        let mut url = http::with_segments(endpoint, &["flavors", "detail"])?;
        url.query_pairs_mut().append_pair("is_public", "None");

        let body = self.get_compute(&url).await?;
        let raw: Vec<Value> = body
            .get("flavors")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let flavors: Vec<Option<Flavor>> = stream::iter(raw)
            .map(|flavor| async move {
                let is_public = flavor
                    .get("os-flavor-access:is_public")
                    .map(|v| lenient_bool(Some(v)))
                    .unwrap_or(true);
                let projects = match (is_public, str_field(&flavor, "id")) {
                    (false, Some(id)) => self.flavor_projects(endpoint, &id).await?,
                    _ => Vec::new(),
                };
                Ok::<_, BackendError>(parse_flavor(&flavor, projects))
            })
            .buffered(DETAIL_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(flavors.into_iter().flatten().collect())
    }

    async fn flavor_projects(&self, endpoint: &Url, flavor_id: &str) -> BackendResult<Vec<String>> {
        let url = http::with_segments(endpoint, &["flavors", flavor_id, "os-flavor-access"])?;
        let body = self.get_compute(&url).await?;
        Ok(flavor_access_projects(&body))
    }

    /// Active images, restricted to `tags` when not empty. Follows Glance
    /// pagination.
    pub async fn images(&self, endpoint: &Url, tags: &[String]) -> BackendResult<Vec<Image>> {
        tracing::info!("Retrieve current project accessible images");
        let root = image_root(endpoint);
        let mut url = http::with_segments(&root, &["v2", "images"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("status", "active");
            for tag in tags {
                query.append_pair("tag", tag);
            }
        }

        let mut raw: Vec<Value> = Vec::new();
        let mut pages = 0;
        loop {
            let body = self.get(&url).await?;
            if let Some(items) = body.get("images").and_then(|v| v.as_array()) {
                raw.extend(items.iter().cloned());
            }

            pages += 1;
            match body.get("next").and_then(|v| v.as_str()) {
                Some(next) if pages < MAX_PAGES => url = resolve_next(&root, next)?,
                Some(_) => {
                    tracing::warn!("Stopped following image pages after {} requests", pages);
                    break;
                }
                None => break,
            }
        }

        let images: Vec<Option<Image>> = stream::iter(raw)
            .map(|image| {
                let root = &root;
                async move {
                    let members = match (image_visibility(&image), str_field(&image, "id")) {
                        (ImageVisibility::Shared, Some(id)) => self.image_members(root, &id).await?,
                        _ => Vec::new(),
                    };
                    Ok::<_, BackendError>(parse_image(&image, members))
                }
            })
            .buffered(DETAIL_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(images.into_iter().flatten().collect())
    }

    async fn image_members(&self, root: &Url, image_id: &str) -> BackendResult<Vec<String>> {
        let url = http::with_segments(root, &["v2", "images", image_id, "members"])?;
        let body = self.get(&url).await?;
        Ok(accepted_members(&body))
    }

    /// Active networks. `tags` is forwarded as a `tags-any` hint. Follows
    /// Neutron pagination links.
    pub async fn networks(&self, endpoint: &Url, tags: &[String]) -> BackendResult<Vec<RawNetwork>> {
        tracing::info!("Retrieve current project accessible networks");
        let base = http::versioned(endpoint, "v2.0")?;
        let mut url = http::with_segments(&base, &["networks"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("status", "ACTIVE");
            if !tags.is_empty() {
                query.append_pair("tags-any", &tags.join(","));
            }
        }

        let mut networks = Vec::new();
        let mut pages = 0;
        loop {
            let body = self.get(&url).await?;
            if let Some(items) = body.get("networks").and_then(|v| v.as_array()) {
                networks.extend(items.iter().filter_map(parse_network));
            }

            pages += 1;
            match next_link(&body, "networks_links") {
                Some(next) if pages < MAX_PAGES => {
                    url = url.join(next).map_err(|e| BackendError::Decode {
                        url: url.to_string(),
                        reason: format!("invalid next link `{}`: {}", next, e),
                    })?;
                }
                Some(_) => {
                    tracing::warn!("Stopped following network pages after {} requests", pages);
                    break;
                }
                None => break,
            }
        }
        Ok(networks)
    }
}
