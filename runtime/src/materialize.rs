//! Image materialization: pull, filesystem expansion and derived records.
//!
//! Everything a run puts on disk lives in one temporary directory owned by
//! [`MaterializedImage`]:
//!
//! ```text
//! ccert-XXXXXX/
//! ├── cache/   OCI image layout as pulled
//! └── fs/      flattened root filesystem
//! ```
//!
//! Dropping the [`MaterializedImage`] removes the directory.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ccert_core::error::{CertError, Result};
use ccert_core::Policy;
use tempfile::TempDir;
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;

use crate::artifacts::{ArtifactWriter, CERT_IMAGE_FILENAME, RPM_MANIFEST_FILENAME};
use crate::oci::{export_layers, extract_archive, ExtractSummary, ImageFetcher, ImageReference, OciImage};
use crate::packages::{PackageInfo, PackageScanner};
use crate::pyxis::CertImage;
use crate::record::{build_cert_image, build_rpm_manifest, measure_layer_sizes};

/// Buffer between the exporter and the extractor.
const PIPE_BUFFER: usize = 256 * 1024;

/// An image under test: extracted filesystem plus parsed metadata.
#[derive(Debug)]
pub struct MaterializedImage {
    image_uri: String,
    reference: ImageReference,
    image: OciImage,
    fs_path: PathBuf,
    packages: Option<Vec<PackageInfo>>,
    // Dropped last; removes everything above from disk.
    _workdir: TempDir,
}

impl MaterializedImage {
    /// The image reference exactly as the user gave it.
    pub fn image_uri(&self) -> &str {
        &self.image_uri
    }

    pub fn reference(&self) -> &ImageReference {
        &self.reference
    }

    pub fn registry(&self) -> &str {
        &self.reference.registry
    }

    pub fn repository(&self) -> &str {
        &self.reference.repository
    }

    /// Tag or digest the image was referenced by.
    pub fn tag_or_digest(&self) -> &str {
        self.reference.identifier()
    }

    pub fn image(&self) -> &OciImage {
        &self.image
    }

    /// Root of the extracted filesystem.
    pub fn fs_path(&self) -> &Path {
        &self.fs_path
    }

    /// Installed packages, when an inventory was taken.
    pub fn packages(&self) -> Option<&[PackageInfo]> {
        self.packages.as_deref()
    }
}

#[cfg(test)]
impl MaterializedImage {
    /// Wrap a work directory that already holds `cache/` (layout) and `fs/`.
    pub(crate) fn from_parts(
        workdir: TempDir,
        image_uri: &str,
        packages: Option<Vec<PackageInfo>>,
    ) -> Result<Self> {
        let image = OciImage::from_path(workdir.path().join("cache"))?;
        Ok(Self {
            image_uri: image_uri.to_string(),
            reference: ImageReference::parse(image_uri)?,
            image,
            fs_path: workdir.path().join("fs"),
            packages,
            _workdir: workdir,
        })
    }
}

/// Drives pull, extraction and record building for one run.
pub struct Materializer {
    fetcher: Arc<dyn ImageFetcher>,
    scanner: Arc<dyn PackageScanner>,
    artifacts: ArtifactWriter,
}

impl Materializer {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        scanner: Arc<dyn PackageScanner>,
        artifacts: ArtifactWriter,
    ) -> Self {
        Self {
            fetcher,
            scanner,
            artifacts,
        }
    }

    /// Pull `image_uri` into a fresh temporary directory.
    pub async fn pull(&self, image_uri: &str, cancel: &CancellationToken) -> Result<PulledImage> {
        let reference = ImageReference::parse(image_uri)?;
        let workdir = tempfile::Builder::new()
            .prefix("ccert-")
            .tempdir()
            .map_err(|e| CertError::Other(format!("Failed to create temporary directory: {}", e)))?;
        tracing::debug!(path = %workdir.path().display(), "Created temporary directory");

        let image = self
            .fetcher
            .fetch(&reference, &workdir.path().join("cache"), cancel)
            .await?;

        Ok(PulledImage {
            image_uri: image_uri.to_string(),
            reference,
            image,
            workdir,
        })
    }

    /// Expand the pulled image's filesystem and write the certification record.
    pub async fn extract(&self, pulled: PulledImage, cancel: &CancellationToken) -> Result<MaterializedImage> {
        let fs_path = pulled.workdir.path().join("fs");
        tokio::fs::create_dir(&fs_path).await?;

        tracing::debug!(path = %fs_path.display(), "Extracting container filesystem");
        let summary = expand_filesystem(&pulled.image, &fs_path, cancel).await?;
        tracing::debug!(files = summary.files, skipped = summary.skipped, "Filesystem extracted");

        let materialized = MaterializedImage {
            image_uri: pulled.image_uri,
            reference: pulled.reference,
            image: pulled.image,
            fs_path,
            packages: None,
            _workdir: pulled.workdir,
        };

        self.write_cert_image(&materialized)
            .await
            .map_err(|e| CertError::Other(format!("Could not write cert image: {}", e)))?;
        Ok(materialized)
    }

    async fn write_cert_image(&self, image: &MaterializedImage) -> Result<CertImage> {
        let oci = image.image.clone();
        let sizes = tokio::task::spawn_blocking(move || measure_layer_sizes(&oci))
            .await
            .map_err(|e| CertError::Other(format!("Layer size task failed: {}", e)))??;
        let record = build_cert_image(&image.image, &image.reference, sizes, chrono::Utc::now())?;
        let path = self.artifacts.write_json(CERT_IMAGE_FILENAME, &record)?;
        tracing::trace!(file = %path.display(), "Image config written to disk");
        Ok(record)
    }

    /// Take the package inventory unless the policy is scratch.
    ///
    /// A failed scan is logged and the run continues without an inventory;
    /// an empty manifest is still written so the bundle stays submittable.
    pub async fn inventory(&self, image: &mut MaterializedImage, policy: Policy) {
        if !policy.has_package_manifest() {
            tracing::debug!(%policy, "Skipping package inventory");
            return;
        }
        let packages = match self.scanner.list_packages(&image.fs_path).await {
            Ok(packages) => Some(packages),
            Err(e) => {
                tracing::error!(error = %e, "Could not get rpm list, continuing without it");
                None
            }
        };
        let manifest = build_rpm_manifest(packages.as_deref().unwrap_or_default());
        match self.artifacts.write_json(RPM_MANIFEST_FILENAME, &manifest) {
            Ok(path) => tracing::trace!(file = %path.display(), "RPM manifest written to disk"),
            Err(e) => tracing::error!(error = %e, "Could not write rpm manifest"),
        }
        image.packages = packages;
    }
}

/// An image pulled to disk but not yet extracted.
pub struct PulledImage {
    image_uri: String,
    reference: ImageReference,
    image: OciImage,
    workdir: TempDir,
}

impl PulledImage {
    pub fn image(&self) -> &OciImage {
        &self.image
    }
}

/// Pipe writer that remembers whether the reading side went away.
struct PipeWriter<W> {
    inner: W,
    broken: Arc<AtomicBool>,
}

impl<W> PipeWriter<W> {
    fn mark_broken(&self, err: io::Error) -> io::Error {
        self.broken.store(true, Ordering::SeqCst);
        err
    }
}

impl<W: Write> Write for PipeWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf).map_err(|e| self.mark_broken(e))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().map_err(|e| self.mark_broken(e))
    }
}

/// Flatten the image's layers and extract them under `fs_path`.
///
/// The exporter and the extractor run concurrently on blocking threads,
/// connected through a bounded in-memory pipe. A failed exporter fails the
/// extraction even when the extractor saw a clean end of stream; when the
/// exporter only failed because the extractor stopped reading, the
/// extractor's error is reported.
pub async fn expand_filesystem(
    image: &OciImage,
    fs_path: &Path,
    cancel: &CancellationToken,
) -> Result<ExtractSummary> {
    let (writer, reader) = tokio::io::duplex(PIPE_BUFFER);
    let broken = Arc::new(AtomicBool::new(false));

    let layers = image.layers().to_vec();
    let export_cancel = cancel.clone();
    let export_broken = broken.clone();
    let exporter = tokio::task::spawn_blocking(move || {
        let mut out = PipeWriter {
            inner: SyncIoBridge::new(writer),
            broken: export_broken,
        };
        export_layers(&layers, &mut out, &export_cancel)
        // `out` drops here, closing the pipe.
    });

    let root = fs_path.to_path_buf();
    let extract_cancel = cancel.clone();
    let extractor = tokio::task::spawn_blocking(move || {
        extract_archive(SyncIoBridge::new(reader), &root, &extract_cancel)
    });

    let (exported, extracted) = tokio::join!(exporter, extractor);
    let exported =
        exported.map_err(|e| CertError::ExtractionError(format!("Export task failed: {}", e)))?;
    let extracted =
        extracted.map_err(|e| CertError::ExtractionError(format!("Extract task failed: {}", e)))?;

    match (exported, extracted) {
        (Ok(()), extracted) => extracted,
        (Err(_), Err(extract_err)) if broken.load(Ordering::SeqCst) => Err(extract_err),
        (Err(export_err), _) => Err(export_err),
    }
}
