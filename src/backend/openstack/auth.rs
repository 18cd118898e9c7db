//! Keystone authentication
//!
//! Federated login with an OIDC access token (the `v3oidcaccesstoken` flow):
//! the external token is exchanged for an unscoped Keystone token, which is
//! then rescoped to the target project. The scoped token response carries the
//! service catalog used to locate every other service.

use super::http::{self, OpenstackHttp, SUBJECT_TOKEN_HEADER};
use crate::backend::AuthContext;
use crate::error::{BackendError, BackendResult};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

/// Catalog service types, in order of preference
pub const BLOCK_STORAGE_TYPES: &[&str] = &["block-storage", "volumev3", "volumev2", "volume"];
pub const COMPUTE_TYPES: &[&str] = &["compute"];
pub const IMAGE_TYPES: &[&str] = &["image"];
pub const NETWORK_TYPES: &[&str] = &["network"];

/// Project scoped Keystone token
#[derive(Clone)]
pub struct ScopedToken {
    pub token: String,
    pub project_id: String,
    pub catalog: ServiceCatalog,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceCatalog {
    #[serde(default)]
    entries: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    #[serde(default)]
    region_id: Option<String>,
    #[serde(default)]
    region: Option<String>,
    url: String,
}

impl CatalogEndpoint {
    fn in_region(&self, region: &str) -> bool {
        self.region_id.as_deref() == Some(region) || self.region.as_deref() == Some(region)
    }
}

impl ServiceCatalog {
    /// Parse the `token.catalog` list of a token response. A token without
    /// catalog gives an empty one; a malformed catalog is an error.
    pub fn from_token_body(body: &Value, url: &Url) -> BackendResult<Self> {
        let Some(catalog) = body.get("token").and_then(|t| t.get("catalog")) else {
            return Ok(Self::default());
        };

        let entries = Vec::<CatalogEntry>::deserialize(catalog).map_err(|e| BackendError::Decode {
            url: url.to_string(),
            reason: format!("malformed service catalog: {}", e),
        })?;
        Ok(Self { entries })
    }

    /// Public endpoint of the first service type in `service_types` deployed in `region`
    pub fn endpoint(&self, service_types: &[&str], region: &str) -> Option<Url> {
        service_types.iter().find_map(|service_type| {
            self.entries
                .iter()
                .filter(|e| e.service_type == *service_type)
                .flat_map(|e| e.endpoints.iter())
                .find(|ep| ep.interface == "public" && ep.in_region(region))
                .and_then(|ep| Url::parse(&ep.url).ok())
        })
    }
}

/// Keystone v3 base URL for a configured auth URL
pub fn identity_v3_url(auth_url: &Url) -> BackendResult<Url> {
    http::versioned(auth_url, "v3")
}

/// Exchange the external access token for an unscoped Keystone token
async fn unscoped_token(http: &OpenstackHttp, identity: &Url, ctx: &AuthContext) -> BackendResult<String> {
    let url = http::with_segments(
        identity,
        &[
            "OS-FEDERATION",
            "identity_providers",
            &ctx.idp_name,
            "protocols",
            &ctx.protocol,
            "auth",
        ],
    )?;

    let response = http.post(&url, Some(&ctx.token), None).await?;
    response.header(SUBJECT_TOKEN_HEADER).ok_or_else(|| BackendError::Decode {
        url: url.to_string(),
        reason: format!("missing {} header", SUBJECT_TOKEN_HEADER),
    })
}

/// Rescope `unscoped` to the context project
async fn project_token(
    http: &OpenstackHttp,
    identity: &Url,
    ctx: &AuthContext,
    unscoped: &str,
) -> BackendResult<ScopedToken> {
    let url = http::with_segments(identity, &["auth", "tokens"])?;
    let body = json!({
        "auth": {
            "identity": {
                "methods": ["token"],
                "token": { "id": unscoped }
            },
            "scope": {
                "project": { "id": ctx.project_id }
            }
        }
    });

    let response = http.post(&url, None, Some(&body)).await?;
    let token = response.header(SUBJECT_TOKEN_HEADER).ok_or_else(|| BackendError::Decode {
        url: url.to_string(),
        reason: format!("missing {} header", SUBJECT_TOKEN_HEADER),
    })?;

    let project_id = response
        .body
        .get("token")
        .and_then(|t| t.get("project"))
        .and_then(|p| p.get("id"))
        .and_then(|v| v.as_str())
        .unwrap_or(&ctx.project_id)
        .to_string();

    Ok(ScopedToken {
        token,
        project_id,
        catalog: ServiceCatalog::from_token_body(&response.body, &url)?,
    })
}

/// Run the whole federated login. Every failure is reported as
/// [`BackendError::Connection`].
pub async fn authenticate(http: &OpenstackHttp, ctx: &AuthContext) -> BackendResult<ScopedToken> {
    let identity = identity_v3_url(&ctx.auth_url).map_err(|e| BackendError::Connection(e.to_string()))?;

    let unscoped = unscoped_token(http, &identity, ctx)
        .await
        .map_err(|e| BackendError::Connection(format!("federated login through {} failed: {}", ctx.idp_name, e)))?;

    project_token(http, &identity, ctx, &unscoped)
        .await
        .map_err(|e| BackendError::Connection(format!("scoping to project {} failed: {}", ctx.project_id, e)))
}
