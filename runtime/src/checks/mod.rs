//! Certification checks.
//!
//! The set of checks is closed: every check has a [`CheckId`] and is built
//! from a shared [`CheckDeps`] bundle. Checks are stateless predicates over a
//! [`MaterializedImage`]; an `Err` means the check could not decide.

mod based_on_ubi;
mod has_license;
mod has_modified_files;
mod has_prohibited_packages;
mod has_required_labels;
mod has_unique_tag;
mod layer_count;
mod run_as_non_root;

pub use based_on_ubi::BasedOnUbi;
pub use has_license::HasLicense;
pub use has_modified_files::HasModifiedFiles;
pub use has_prohibited_packages::HasNoProhibitedPackages;
pub use has_required_labels::HasRequiredLabel;
pub use has_unique_tag::HasUniqueTag;
pub use layer_count::{LayerCountAcceptable, ACCEPTABLE_LAYER_MAX};
pub use run_as_non_root::RunAsNonRoot;

use std::sync::Arc;

use async_trait::async_trait;
use ccert_core::error::{CertError, Result};
use ccert_core::{CheckInfo, CheckMetadata, HelpText, Level};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::materialize::MaterializedImage;
use crate::oci::ImageFetcher;
use crate::packages::PackageScanner;
use crate::pyxis::AuthorityClient;

/// Container certification policy guide.
pub const CERT_DOCUMENTATION_URL: &str = "https://access.redhat.com/documentation/en-us/red_hat_software_certification/2024/html/red_hat_openshift_software_certification_policy_guide/assembly-requirements-for-container-images_openshift-sw-cert-policy-introduction";

/// A single certification rule.
#[async_trait]
pub trait Check: Send + Sync {
    fn id(&self) -> CheckId;

    fn name(&self) -> &'static str {
        self.id().name()
    }

    /// Evaluate the rule. `Ok(false)` is a failed check, `Err` an errored one.
    async fn validate(&self, image: &MaterializedImage, cancel: &CancellationToken) -> Result<bool>;

    fn metadata(&self) -> CheckMetadata;

    fn help(&self) -> HelpText;

    /// Identity and help detached from the check instance.
    fn info(&self) -> CheckInfo {
        CheckInfo {
            name: self.name().to_string(),
            metadata: self.metadata(),
            help: self.help(),
        }
    }
}

/// Identifier of every known check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckId {
    HasLicense,
    HasUniqueTag,
    LayerCountAcceptable,
    HasNoProhibitedPackages,
    HasRequiredLabel,
    RunAsNonRoot,
    HasModifiedFiles,
    BasedOnUbi,
}

impl CheckId {
    pub const ALL: [CheckId; 8] = [
        CheckId::HasLicense,
        CheckId::HasUniqueTag,
        CheckId::LayerCountAcceptable,
        CheckId::HasNoProhibitedPackages,
        CheckId::HasRequiredLabel,
        CheckId::RunAsNonRoot,
        CheckId::HasModifiedFiles,
        CheckId::BasedOnUbi,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::HasLicense => "HasLicense",
            Self::HasUniqueTag => "HasUniqueTag",
            Self::LayerCountAcceptable => "LayerCountAcceptable",
            Self::HasNoProhibitedPackages => "HasNoProhibitedPackages",
            Self::HasRequiredLabel => "HasRequiredLabel",
            Self::RunAsNonRoot => "RunAsNonRoot",
            Self::HasModifiedFiles => "HasModifiedFiles",
            Self::BasedOnUbi => "BasedOnUbi",
        }
    }

    /// Instantiate the check.
    pub fn build(self, deps: &CheckDeps) -> Box<dyn Check> {
        match self {
            Self::HasLicense => Box::new(HasLicense),
            Self::HasUniqueTag => Box::new(HasUniqueTag::new(deps.fetcher.clone())),
            Self::LayerCountAcceptable => Box::new(LayerCountAcceptable),
            Self::HasNoProhibitedPackages => Box::new(HasNoProhibitedPackages),
            Self::HasRequiredLabel => Box::new(HasRequiredLabel),
            Self::RunAsNonRoot => Box::new(RunAsNonRoot),
            Self::HasModifiedFiles => Box::new(HasModifiedFiles::new(deps.scanner.clone())),
            Self::BasedOnUbi => Box::new(BasedOnUbi::new(deps.authority.clone())),
        }
    }
}

impl std::fmt::Display for CheckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for CheckId {
    type Err = CertError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CertError::ConfigError(format!("unknown check '{}'", s)))
    }
}

/// Collaborators the checks reach out to.
#[derive(Clone)]
pub struct CheckDeps {
    pub fetcher: Arc<dyn ImageFetcher>,
    pub scanner: Arc<dyn PackageScanner>,
    pub authority: Arc<dyn AuthorityClient>,
}

fn metadata(description: impl Into<String>, level: Level) -> CheckMetadata {
    CheckMetadata {
        description: description.into(),
        level,
        knowledge_base_url: CERT_DOCUMENTATION_URL.to_string(),
        check_url: CERT_DOCUMENTATION_URL.to_string(),
    }
}

fn help(id: CheckId, suggestion: &str) -> HelpText {
    HelpText {
        message: format!(
            "Check {} encountered an error. Please review the preflight.log file for more information.",
            id.name()
        ),
        suggestion: suggestion.to_string(),
    }
}

fn check_error(id: CheckId, message: impl std::fmt::Display) -> CertError {
    CertError::CheckError {
        check: id.name().to_string(),
        message: message.to_string(),
    }
}
