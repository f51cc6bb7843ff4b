//! Installed package inventory of an extracted filesystem.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ccert_core::error::{CertError, Result};
use tokio::process::Command;

/// One installed package as reported by the package database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub epoch: u32,
    /// Source package file name, e.g. `bash-5.1.8-6.el9.src.rpm`.
    pub source_rpm: Option<String>,
    pub summary: String,
    /// Signature description, e.g. `RSA/SHA256, <date>, Key ID 199e2f91fd431d51`.
    pub signature: Option<String>,
}

/// Reads the package database of an extracted root filesystem.
#[async_trait]
pub trait PackageScanner: Send + Sync {
    /// All installed packages.
    async fn list_packages(&self, root: &Path) -> Result<Vec<PackageInfo>>;

    /// Every file path owned by an installed package, relative to the root.
    async fn owned_files(&self, root: &Path) -> Result<HashSet<String>>;
}

const PACKAGE_QUERY_FORMAT: &str = "%{NAME}\\t%{VERSION}\\t%{RELEASE}\\t%{ARCH}\\t%{EPOCH}\\t%{SOURCERPM}\\t%{SUMMARY}\\t%|RSAHEADER?{%{RSAHEADER:pgpsig}}:{%|DSAHEADER?{%{DSAHEADER:pgpsig}}:{(none)}|}|\\n";
const FILES_QUERY_FORMAT: &str = "[%{FILENAMES}\\n]";

/// Package database locations, newest first.
const RPM_DB_PATHS: &[&str] = &["usr/lib/sysimage/rpm", "var/lib/rpm"];

/// `rpm` command line scanner.
#[derive(Debug, Clone)]
pub struct RpmScanner {
    binary: PathBuf,
}

impl Default for RpmScanner {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("rpm"),
        }
    }
}

impl RpmScanner {
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn query(&self, root: &Path, format: &str) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--root").arg(root);
        if let Some(db) = RPM_DB_PATHS.iter().find(|p| root.join(p).is_dir()) {
            cmd.arg("--dbpath").arg(format!("/{}", db));
        }
        cmd.arg("-qa").arg("--queryformat").arg(format);

        tracing::debug!(root = %root.display(), "Querying rpm database");
        let output = cmd.output().await.map_err(|e| {
            CertError::Other(format!(
                "Failed to run {}: {}",
                self.binary.display(),
                e
            ))
        })?;
        if !output.status.success() {
            return Err(CertError::Other(format!(
                "rpm query failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl PackageScanner for RpmScanner {
    async fn list_packages(&self, root: &Path) -> Result<Vec<PackageInfo>> {
        let stdout = self.query(root, PACKAGE_QUERY_FORMAT).await?;
        let packages: Vec<PackageInfo> = stdout.lines().filter_map(parse_package_line).collect();
        tracing::debug!(count = packages.len(), "Found installed packages");
        Ok(packages)
    }

    async fn owned_files(&self, root: &Path) -> Result<HashSet<String>> {
        let stdout = self.query(root, FILES_QUERY_FORMAT).await?;
        Ok(stdout
            .lines()
            .map(|l| l.trim_start_matches('/').to_string())
            .filter(|l| !l.is_empty() && l != "(contains no files)")
            .collect())
    }
}

fn none_to_option(value: &str) -> Option<String> {
    match value.trim() {
        "" | "(none)" => None,
        v => Some(v.to_string()),
    }
}

/// Parse one line of [`PACKAGE_QUERY_FORMAT`] output.
fn parse_package_line(line: &str) -> Option<PackageInfo> {
    let fields: Vec<&str> = line.split('\t').collect();
    let [name, version, release, arch, epoch, source, summary, signature] = fields.as_slice() else {
        if !line.trim().is_empty() {
            tracing::debug!(line, "Skipping malformed rpm query line");
        }
        return None;
    };
    Some(PackageInfo {
        name: name.to_string(),
        version: version.to_string(),
        release: release.to_string(),
        arch: none_to_option(arch).unwrap_or_default(),
        epoch: epoch.trim().parse().unwrap_or(0),
        source_rpm: none_to_option(source),
        summary: summary.to_string(),
        signature: none_to_option(signature),
    })
}
