//! Identity resolution
//!
//! Finds, for a project, the issuer whose user group holds the project's SLA
//! and the auth method the provider trusts for that issuer.

use crate::error::ResolveError;
use crate::model::{Issuer, Project, ResolvedIdentity, ScopedSla, ScopedUserGroup, Sla, TrustedIdp, UserGroup};

/// Resolve the identity context to use to access `project`.
///
/// Issuers, user groups and SLAs are walked in declaration order. When the
/// same SLA document appears under several issuers the first one having a
/// trusted auth method on this provider wins.
pub fn resolve_identity(
    project: &Project,
    issuers: &[Issuer],
    trusted_idps: &[TrustedIdp],
) -> Result<ResolvedIdentity, ResolveError> {
    let candidates = matching_slas(project, issuers);
    let Some((first_issuer, _, _)) = candidates.first() else {
        return Err(ResolveError::NoMatchingSla {
            project: project.id.clone(),
            sla: project.sla.clone(),
        });
    };

    for (issuer, user_group, sla) in &candidates {
        if let Some(idp) = trusted_idps.iter().find(|i| i.endpoint == issuer.endpoint) {
            tracing::debug!(
                "Project {} resolved through issuer {} (user group {})",
                project.id,
                issuer.endpoint,
                user_group.name
            );
            return Ok(scoped_identity(issuer, user_group, sla, idp, &project.id));
        }
    }

    Err(ResolveError::AuthMethodMismatch {
        project: project.id.clone(),
        issuer: first_issuer.endpoint.to_string(),
        trusted: trusted_idps.iter().map(|i| i.endpoint.to_string()).collect(),
    })
}

/// Every (issuer, user group, SLA) triple whose SLA is the project one
fn matching_slas<'a>(
    project: &Project,
    issuers: &'a [Issuer],
) -> Vec<(&'a Issuer, &'a UserGroup, &'a Sla)> {
    issuers
        .iter()
        .flat_map(|issuer| {
            issuer.user_groups.iter().flat_map(move |group| {
                group
                    .slas
                    .iter()
                    .filter(|sla| sla.doc_uuid == project.sla)
                    .map(move |sla| (issuer, group, sla))
            })
        })
        .collect()
}

fn scoped_identity(
    issuer: &Issuer,
    user_group: &UserGroup,
    sla: &Sla,
    idp: &TrustedIdp,
    project_id: &str,
) -> ResolvedIdentity {
    ResolvedIdentity {
        endpoint: issuer.endpoint.clone(),
        group_claim: issuer.group_claim.clone(),
        description: issuer.description.clone(),
        relationship: idp.auth_method(),
        token: issuer.token.clone(),
        user_group: ScopedUserGroup {
            name: user_group.name.clone(),
            description: user_group.description.clone(),
            sla: ScopedSla::new(sla, project_id),
        },
    }
}
