use async_trait::async_trait;
use ccert_core::error::Result;
use ccert_core::{CheckMetadata, HelpText, Level};
use tokio_util::sync::CancellationToken;

use super::{check_error, help, metadata, Check, CheckId};
use crate::materialize::MaterializedImage;

/// Packages that may not be redistributed outside of UBI.
const PROHIBITED_PACKAGES: &[&str] = &[
    "grub",
    "grub2",
    "kernel",
    "kernel-core",
    "kernel-debug",
    "kernel-debug-core",
    "kernel-debug-modules",
    "kernel-debug-modules-extra",
    "kernel-debug-devel",
    "kernel-devel",
    "kernel-doc",
    "kernel-modules",
    "kernel-modules-extra",
    "kernel-tools",
    "kernel-tools-libs",
    "kmod-kvdo",
    "linux-firmware",
];

/// Name prefixes that are prohibited in full.
const PROHIBITED_PREFIXES: &[&str] = &["kpatch"];

fn is_prohibited(name: &str) -> bool {
    PROHIBITED_PACKAGES.contains(&name) || PROHIBITED_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// No kernel, bootloader or firmware packages are installed.
pub struct HasNoProhibitedPackages;

#[async_trait]
impl Check for HasNoProhibitedPackages {
    fn id(&self) -> CheckId {
        CheckId::HasNoProhibitedPackages
    }

    async fn validate(&self, image: &MaterializedImage, _cancel: &CancellationToken) -> Result<bool> {
        let packages = image
            .packages()
            .ok_or_else(|| check_error(self.id(), "no package inventory available for the image"))?;

        let found: Vec<&str> = packages
            .iter()
            .map(|p| p.name.as_str())
            .filter(|name| is_prohibited(name))
            .collect();
        if !found.is_empty() {
            tracing::debug!(packages = ?found, "Prohibited packages found");
        }
        Ok(found.is_empty())
    }

    fn metadata(&self) -> CheckMetadata {
        metadata(
            "Checks to ensure that the image in use does not include prohibited packages, such as Red Hat Enterprise Linux (RHEL) kernel packages.",
            Level::Best,
        )
    }

    fn help(&self) -> HelpText {
        help(self.id(), "Remove any RHEL packages that are not distributable outside of UBI")
    }
}
