//! Registry client adapter.
//!
//! Uses the `oci-distribution` crate to pull an image into an OCI image
//! layout on disk. Every registry operation gets one retry after a fixed
//! delay and aborts promptly when the run is cancelled.

use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use ccert_core::error::{CertError, Result};
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::{ImageIndexEntry, OciDescriptor};
use oci_distribution::{Client, Reference};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::credentials::{RegistryAuth, RegistryCredentials};
use super::image::{blob_path, OciImage};
use super::reference::ImageReference;

/// Delay before the single retry of a failed registry operation.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Source of pulled images and repository tag listings.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Pull `reference` into an OCI layout at `target_dir` and load it.
    async fn fetch(
        &self,
        reference: &ImageReference,
        target_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<OciImage>;

    /// List the tags of the reference's repository.
    async fn list_tags(
        &self,
        reference: &ImageReference,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>>;
}

/// Target platform of a pull, e.g. `amd64`, `linux/arm64/v8`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    pub variant: Option<String>,
}

impl FromStr for Platform {
    type Err = CertError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        let (os, architecture, variant) = match parts.as_slice() {
            [arch] => ("linux", *arch, None),
            [os, arch] => (*os, *arch, None),
            [os, arch, variant] => (*os, *arch, Some(variant.to_string())),
            _ => ("", "", None),
        };
        if os.is_empty() || architecture.is_empty() {
            return Err(CertError::ConfigError(format!("Invalid platform '{}'", s)));
        }
        Ok(Self {
            os: os.to_string(),
            architecture: architecture.to_string(),
            variant,
        })
    }
}

impl Platform {
    /// Pick the manifest of a multi-arch index matching this platform.
    fn resolve(&self, manifests: &[ImageIndexEntry]) -> Option<String> {
        let matching = |entry: &&ImageIndexEntry| {
            entry.platform.as_ref().map_or(false, |p| {
                p.os == self.os && p.architecture == self.architecture
            })
        };
        let exact = manifests.iter().filter(matching).find(|entry| {
            match (&self.variant, entry.platform.as_ref().and_then(|p| p.variant.as_ref())) {
                (Some(want), Some(have)) => want == have,
                (Some(_), None) => false,
                (None, _) => true,
            }
        });
        exact
            .or_else(|| manifests.iter().find(matching))
            .map(|entry| entry.digest.clone())
    }
}

/// Pulls images from container registries into OCI layouts.
pub struct RegistryPuller {
    client: Client,
    credentials: RegistryCredentials,
    retry_delay: Duration,
}

impl RegistryPuller {
    /// Create a puller for one run.
    ///
    /// `insecure` turns off certificate validation for this client only.
    pub fn new(credentials: RegistryCredentials, platform: Platform, insecure: bool) -> Self {
        if insecure {
            tracing::warn!("TLS certificate validation disabled for registry access");
        }
        let config = ClientConfig {
            protocol: ClientProtocol::Https,
            accept_invalid_certificates: insecure,
            platform_resolver: Some(Box::new(move |manifests: &[ImageIndexEntry]| {
                platform.resolve(manifests)
            })),
            ..Default::default()
        };

        Self {
            client: Client::new(config),
            credentials,
            retry_delay: RETRY_DELAY,
        }
    }

    /// Override the delay before the retry.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn pull_once(
        &self,
        reference: &ImageReference,
        oci_ref: &Reference,
        auth: &RegistryAuth,
        target_dir: &Path,
    ) -> Result<()> {
        let registry_error = |message: String| CertError::RegistryError {
            registry: reference.registry.clone(),
            message,
        };

        tokio::fs::create_dir_all(target_dir.join("blobs").join("sha256"))
            .await
            .map_err(|e| registry_error(format!("Failed to create blobs directory: {}", e)))?;

        let (manifest, manifest_digest) = self
            .client
            .pull_image_manifest(oci_ref, &auth.to_oci_auth())
            .await
            .map_err(|e| registry_error(format!("Failed to pull manifest: {}", e)))?;

        let manifest_json = serde_json::to_vec(&manifest)?;
        tokio::fs::write(blob_path(target_dir, &manifest_digest), &manifest_json)
            .await
            .map_err(|e| registry_error(format!("Failed to write manifest: {}", e)))?;

        self.pull_blob(oci_ref, &manifest.config, target_dir)
            .await
            .map_err(|e| registry_error(format!("Failed to pull config blob: {}", e)))?;

        for layer in &manifest.layers {
            tracing::debug!(digest = %layer.digest, size = layer.size, "Pulling layer");
            self.pull_blob(oci_ref, layer, target_dir)
                .await
                .map_err(|e| registry_error(format!("Failed to pull layer {}: {}", layer.digest, e)))?;
        }

        tokio::fs::write(
            target_dir.join("oci-layout"),
            r#"{"imageLayoutVersion":"1.0.0"}"#,
        )
        .await
        .map_err(|e| registry_error(format!("Failed to write oci-layout: {}", e)))?;

        let index = serde_json::json!({
            "schemaVersion": 2,
            "manifests": [{
                "mediaType": manifest.media_type.clone()
                    .unwrap_or_else(|| "application/vnd.oci.image.manifest.v1+json".to_string()),
                "digest": manifest_digest,
                "size": manifest_json.len()
            }]
        });
        tokio::fs::write(target_dir.join("index.json"), serde_json::to_vec_pretty(&index)?)
            .await
            .map_err(|e| registry_error(format!("Failed to write index.json: {}", e)))?;

        Ok(())
    }

    /// Stream one blob to its place in the layout.
    async fn pull_blob(
        &self,
        oci_ref: &Reference,
        descriptor: &OciDescriptor,
        target_dir: &Path,
    ) -> std::result::Result<(), String> {
        let path = blob_path(target_dir, &descriptor.digest);
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| e.to_string())?;
        self.client
            .pull_blob(oci_ref, descriptor, &mut file)
            .await
            .map_err(|e| e.to_string())?;
        file.flush().await.map_err(|e| e.to_string())?;
        drop(file);

        let expected = descriptor.digest.clone();
        tokio::task::spawn_blocking(move || verify_blob(&path, &expected))
            .await
            .map_err(|e| e.to_string())?
    }
}

/// Check a stored blob against its `sha256:` descriptor digest.
pub(crate) fn verify_blob(path: &Path, expected: &str) -> std::result::Result<(), String> {
    let Some(expected_hex) = expected.strip_prefix("sha256:") else {
        return Err(format!("unsupported digest algorithm: {}", expected));
    };
    let mut file = std::fs::File::open(path).map_err(|e| e.to_string())?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| e.to_string())?;
    let actual = hex::encode(hasher.finalize());
    if actual != expected_hex {
        return Err(format!("digest mismatch: expected {}, got sha256:{}", expected, actual));
    }
    Ok(())
}

#[async_trait]
impl ImageFetcher for RegistryPuller {
    async fn fetch(
        &self,
        reference: &ImageReference,
        target_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<OciImage> {
        let oci_ref = to_oci_reference(reference)?;
        let auth = self.credentials.resolve(&reference.registry)?;

        tracing::info!(
            reference = %reference,
            target = %target_dir.display(),
            "Pulling image from registry"
        );

        retry_once("pull image", self.retry_delay, cancel, || {
            self.pull_once(reference, &oci_ref, &auth, target_dir)
        })
        .await?;

        let image = OciImage::from_path(target_dir)?;
        tracing::info!(reference = %reference, digest = %image.digest(), "Image pulled");
        Ok(image)
    }

    async fn list_tags(
        &self,
        reference: &ImageReference,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let oci_ref = to_oci_reference(reference)?;
        let auth = self.credentials.resolve(&reference.registry)?.to_oci_auth();

        let response = retry_once("list tags", self.retry_delay, cancel, || async {
            self.client
                .list_tags(&oci_ref, &auth, None, None)
                .await
                .map_err(|e| CertError::RegistryError {
                    registry: reference.registry.clone(),
                    message: format!("Failed to list tags for {}: {}", reference.repository, e),
                })
        })
        .await?;
        Ok(response.tags)
    }
}

/// Run `operation`, retrying once after `delay` unless it was cancelled.
pub(crate) async fn retry_once<T, F, Fut>(
    name: &str,
    delay: Duration,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match cancellable(name, cancel, operation()).await {
        Ok(value) => return Ok(value),
        Err(e) if e.is_cancelled() => return Err(e),
        Err(e) => {
            tracing::warn!(operation = name, error = %e, delay_secs = delay.as_secs(), "Registry operation failed, retrying once");
        }
    }

    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = cancel.cancelled() => return Err(CertError::Cancelled(name.to_string())),
    }
    cancellable(name, cancel, operation()).await
}

async fn cancellable<T>(
    name: &str,
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        result = fut => result,
        _ = cancel.cancelled() => Err(CertError::Cancelled(name.to_string())),
    }
}

fn to_oci_reference(reference: &ImageReference) -> Result<Reference> {
    let pull_ref = reference.pull_reference();
    pull_ref.parse::<Reference>().map_err(|e| {
        CertError::OciImageError(format!("Invalid OCI reference '{}': {}", pull_ref, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use oci_distribution::manifest::Platform as IndexPlatform;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entry(digest: &str, arch: &str, variant: Option<&str>) -> ImageIndexEntry {
        ImageIndexEntry {
            media_type: "application/vnd.oci.image.manifest.v1+json".to_string(),
            digest: digest.to_string(),
            size: 0,
            platform: Some(IndexPlatform {
                architecture: arch.to_string(),
                os: "linux".to_string(),
                os_version: None,
                os_features: None,
                variant: variant.map(str::to_string),
                features: None,
            }),
            annotations: None,
        }
    }

    #[test]
    fn test_platform_parse() {
        let p: Platform = "amd64".parse().unwrap();
        assert_eq!(p.os, "linux");
        assert_eq!(p.architecture, "amd64");

        let p: Platform = "linux/arm64/v8".parse().unwrap();
        assert_eq!(p.architecture, "arm64");
        assert_eq!(p.variant.as_deref(), Some("v8"));

        assert!("".parse::<Platform>().is_err());
        assert!("a/b/c/d".parse::<Platform>().is_err());
    }

    #[test]
    fn test_platform_resolve() {
        let manifests = vec![
            entry("sha256:amd", "amd64", None),
            entry("sha256:armv7", "arm", Some("v7")),
            entry("sha256:arm64", "arm64", Some("v8")),
        ];
        let amd: Platform = "amd64".parse().unwrap();
        assert_eq!(amd.resolve(&manifests).as_deref(), Some("sha256:amd"));

        let arm: Platform = "linux/arm64".parse().unwrap();
        assert_eq!(arm.resolve(&manifests).as_deref(), Some("sha256:arm64"));

        let s390: Platform = "s390x".parse().unwrap();
        assert_eq!(s390.resolve(&manifests), None);
    }

    #[test]
    fn test_to_oci_reference() {
        let reference = ImageReference::parse("quay.io/org/app:v1").unwrap();
        let oci_ref = to_oci_reference(&reference).unwrap();
        assert_eq!(oci_ref.registry(), "quay.io");
        assert_eq!(oci_ref.repository(), "org/app");
        assert_eq!(oci_ref.tag(), Some("v1"));
    }

    #[tokio::test]
    async fn test_retry_once_recovers() {
        let attempts = AtomicUsize::new(0);
        let result = retry_once("op", Duration::ZERO, &CancellationToken::new(), || async {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(CertError::Other("transient".to_string()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_once_gives_up_after_second_failure() {
        let attempts = AtomicUsize::new(0);
        let result: Result<()> = retry_once("op", Duration::ZERO, &CancellationToken::new(), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(CertError::Other("down".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_verify_blob() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, b"layer").unwrap();
        let digest = format!("sha256:{}", hex::encode(Sha256::digest(b"layer")));

        verify_blob(&path, &digest).unwrap();
        let err = verify_blob(&path, &format!("sha256:{}", "0".repeat(64))).unwrap_err();
        assert!(err.contains("digest mismatch"));
        assert!(verify_blob(&path, "sha512:abc").is_err());
    }

    #[tokio::test]
    async fn test_retry_once_observes_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<()> = retry_once("op", Duration::from_secs(60), &cancel, || {
            std::future::pending::<Result<()>>()
        })
        .await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
