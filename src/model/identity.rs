//! Identity federation entities
//!
//! Issuers are the external identity providers trusted by the federation.
//! Each holds user groups, and each user group is authorized on projects
//! through SLA documents.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Service Level Agreement document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sla {
    pub doc_uuid: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Projects authorized by this document
    #[serde(default)]
    pub projects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub slas: Vec<Sla>,
}

/// External identity provider
#[derive(Clone, Deserialize)]
pub struct Issuer {
    #[serde(rename = "issuer", alias = "endpoint")]
    pub endpoint: Url,
    pub group_claim: String,
    #[serde(default)]
    pub description: String,
    /// Access token. Filled by the loader when the document omits it.
    #[serde(default)]
    pub token: String,
    pub user_groups: Vec<UserGroup>,
}

// Security: never print tokens
impl fmt::Debug for Issuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Issuer")
            .field("endpoint", &self.endpoint.as_str())
            .field("group_claim", &self.group_claim)
            .field("description", &self.description)
            .field("token", &"<redacted>")
            .field("user_groups", &self.user_groups)
            .finish()
    }
}

/// Identity provider name and protocol pair used to authenticate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthMethod {
    pub idp_name: String,
    pub protocol: String,
}

/// SLA narrowed to a single project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopedSla {
    pub doc_uuid: String,
    pub start_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub project: String,
}

impl ScopedSla {
    pub fn new(sla: &Sla, project: &str) -> Self {
        Self {
            doc_uuid: sla.doc_uuid.clone(),
            start_date: sla.start_date,
            end_date: sla.end_date,
            project: project.to_string(),
        }
    }
}

/// User group carrying exactly one project scoped SLA
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopedUserGroup {
    pub name: String,
    pub description: String,
    pub sla: ScopedSla,
}

/// Everything needed to open a session on a provider for one project.
/// Built by identity resolution, consumed by harvesting, never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub endpoint: Url,
    pub group_claim: String,
    pub description: String,
    pub relationship: AuthMethod,
    pub token: String,
    pub user_group: ScopedUserGroup,
}

impl fmt::Debug for ResolvedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedIdentity")
            .field("endpoint", &self.endpoint.as_str())
            .field("group_claim", &self.group_claim)
            .field("relationship", &self.relationship)
            .field("token", &"<redacted>")
            .field("user_group", &self.user_group)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_token() {
        let issuer = Issuer {
            endpoint: Url::parse("https://iam.example.org").unwrap(),
            group_claim: "groups".to_string(),
            description: String::new(),
            token: "very-secret".to_string(),
            user_groups: vec![],
        };
        let printed = format!("{:?}", issuer);
        assert!(!printed.contains("very-secret"));
        assert!(printed.contains("<redacted>"));
    }
}
