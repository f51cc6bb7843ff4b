//! Dynamic policy selection from certification project attributes.

use ccert_core::error::Result;
use ccert_core::Policy;

use crate::pyxis::{AuthorityClient, CertProject};

/// Policy implied by a project: scratch wins over privileged.
pub fn policy_for_project(project: &CertProject) -> Policy {
    if project.is_scratch() {
        Policy::Scratch
    } else if project.container.privileged {
        Policy::RootException
    } else {
        Policy::Standard
    }
}

/// Resolve the run's policy.
///
/// Without credentials the project cannot be looked up and the standard
/// policy applies. With credentials a failed lookup is an error.
pub async fn resolve_policy(authority: &dyn AuthorityClient, has_credentials: bool) -> Result<Policy> {
    if !has_credentials {
        tracing::debug!("No authority credentials, using the standard container policy");
        return Ok(Policy::Standard);
    }

    let project = authority.get_project().await?;
    let policy = policy_for_project(&project);
    tracing::debug!(project = %project.id, %policy, "Resolved policy from certification project");
    Ok(policy)
}
