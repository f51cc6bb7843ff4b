use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use ccert_core::error::{CertError, Result};
use ccert_core::{CheckMetadata, HelpText, Level};
use tar::{Archive, EntryType};
use tokio_util::sync::CancellationToken;

use super::{check_error, help, metadata, Check, CheckId};
use crate::materialize::MaterializedImage;
use crate::oci::{open_uncompressed, LayerBlob};
use crate::packages::PackageScanner;

/// Package database locations inside a layer.
const RPM_DB_PREFIXES: &[&str] = &["var/lib/rpm/", "usr/lib/sysimage/rpm/"];

/// Package-owned files are only rewritten by layers that also update the
/// package database.
pub struct HasModifiedFiles {
    scanner: Arc<dyn PackageScanner>,
}

impl HasModifiedFiles {
    pub fn new(scanner: Arc<dyn PackageScanner>) -> Self {
        Self { scanner }
    }
}

#[async_trait]
impl Check for HasModifiedFiles {
    fn id(&self) -> CheckId {
        CheckId::HasModifiedFiles
    }

    async fn validate(&self, image: &MaterializedImage, cancel: &CancellationToken) -> Result<bool> {
        let owned: HashSet<String> = self
            .scanner
            .owned_files(image.fs_path())
            .await
            .map_err(|e| check_error(self.id(), format!("could not list package files: {}", e)))?
            .into_iter()
            .map(|path| normalize(&path))
            .collect();

        let layers = image.image().layers().to_vec();
        let cancel = cancel.clone();
        let modified = tokio::task::spawn_blocking(move || find_modified(&layers, &owned, &cancel))
            .await
            .map_err(|e| check_error(self.id(), format!("layer scan task failed: {}", e)))?
            .map_err(|e| check_error(self.id(), e))?;

        if !modified.is_empty() {
            tracing::debug!(files = ?modified, "Package files modified outside of the package manager");
        }
        Ok(modified.is_empty())
    }

    fn metadata(&self) -> CheckMetadata {
        metadata(
            "Checks that no files installed via RPM in the base Red Hat layer have been modified",
            Level::Best,
        )
    }

    fn help(&self) -> HelpText {
        help(
            self.id(),
            "Do not modify any files installed by RPM in the base Red Hat layer",
        )
    }
}

/// Walk layers base first and report owned files rewritten by a layer that
/// left the package database alone.
fn find_modified(layers: &[LayerBlob], owned: &HashSet<String>, cancel: &CancellationToken) -> Result<Vec<String>> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut modified = Vec::new();

    for layer in layers {
        if cancel.is_cancelled() {
            return Err(CertError::Cancelled("modified files scan".to_string()));
        }
        let files = layer_files(layer)?;
        let touches_db = files
            .iter()
            .any(|f| RPM_DB_PREFIXES.iter().any(|db| f.starts_with(db)));
        tracing::trace!(digest = %layer.digest, files = files.len(), touches_db, "Scanned layer");

        if !touches_db {
            modified.extend(
                files
                    .iter()
                    .filter(|f| owned.contains(*f) && seen.contains(*f))
                    .cloned(),
            );
        }
        seen.extend(files);
    }

    modified.sort();
    modified.dedup();
    Ok(modified)
}

/// Regular file and link paths written by one layer.
fn layer_files(layer: &LayerBlob) -> Result<Vec<String>> {
    let mut archive = Archive::new(open_uncompressed(layer)?);
    let mut files = Vec::new();
    let entries = archive.entries().map_err(|e| read_error(layer, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| read_error(layer, e))?;
        if !matches!(
            entry.header().entry_type(),
            EntryType::Regular | EntryType::Continuous | EntryType::Symlink | EntryType::Link
        ) {
            continue;
        }
        let path = entry.path().map_err(|e| read_error(layer, e))?;
        let path = normalize(&path.to_string_lossy());
        let base = path.rsplit('/').next().unwrap_or_default();
        if !path.is_empty() && !base.starts_with(".wh.") {
            files.push(path);
        }
    }
    Ok(files)
}

fn read_error(layer: &LayerBlob, err: std::io::Error) -> CertError {
    CertError::OciImageError(format!("Failed to read layer {}: {}", layer.digest, err))
}

fn normalize(path: &str) -> String {
    path.trim_start_matches("./").trim_start_matches('/').to_string()
}
