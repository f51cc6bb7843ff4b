//! ccert runtime - the container certification pipeline.
//!
//! Pulls an image, expands its filesystem safely, runs the checks of the
//! selected policy, writes the artifact bundle and optionally submits it to
//! the certification authority.

#![allow(clippy::result_large_err)]

pub mod artifacts;
pub mod checklist;
pub mod checks;
pub mod engine;
pub mod materialize;
pub mod oci;
pub mod packages;
pub mod plugin;
pub mod policy_resolver;
pub mod pyxis;
pub mod record;
pub mod results;
pub mod submit;

#[cfg(test)]
mod testutil;

// Re-export common types
pub use artifacts::{ArtifactWriter, CERT_IMAGE_FILENAME, RESULTS_FILENAME, RPM_MANIFEST_FILENAME};
pub use checklist::{build_checklist, checks_for};
pub use checks::{Check, CheckDeps, CheckId};
pub use engine::{CertificationEngine, PolicySource, RunState};
pub use materialize::{MaterializedImage, Materializer};
pub use oci::{ImageFetcher, ImageReference, OciImage, Platform, RegistryCredentials, RegistryPuller};
pub use packages::{PackageInfo, PackageScanner, RpmScanner};
pub use plugin::{deps_from_config, CertificationPlugin, ContainerPlugin, ContainerPolicyKind};
pub use policy_resolver::{policy_for_project, resolve_policy};
pub use pyxis::{AuthorityClient, PyxisClient};
pub use results::{format_text, tag_digest_binding_info, BindingInfo, ResultsReport};
pub use submit::Submitter;

/// ccert runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
