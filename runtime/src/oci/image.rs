//! Pulled image handle backed by an OCI image layout on disk.
//!
//! The registry client writes `oci-layout`, `index.json` and
//! `blobs/sha256/*`; this module loads them back and exposes config,
//! manifest, digest and per-layer content.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ccert_core::error::{CertError, Result};
use oci_spec::image::{ImageConfiguration, ImageIndex, ImageManifest};

/// One layer blob of a pulled image.
#[derive(Debug, Clone)]
pub struct LayerBlob {
    /// Compressed content digest (`sha256:...`)
    pub digest: String,
    /// Layer media type from the manifest
    pub media_type: String,
    /// Compressed size declared in the manifest
    pub size: u64,
    /// Blob location on disk
    pub path: PathBuf,
}

/// An image pulled into an OCI layout.
#[derive(Debug, Clone)]
pub struct OciImage {
    root_dir: PathBuf,
    manifest: ImageManifest,
    manifest_digest: String,
    manifest_size: u64,
    config: ImageConfiguration,
    raw_config: Vec<u8>,
    layers: Vec<LayerBlob>,
}

impl OciImage {
    /// Load an image from an OCI layout directory.
    ///
    /// The first manifest listed in `index.json` is the image.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let root_dir = path.as_ref().to_path_buf();
        Self::validate_oci_layout(&root_dir)?;

        let index: ImageIndex = serde_json::from_slice(&read_file(&root_dir.join("index.json"))?)
            .map_err(|e| CertError::OciImageError(format!("Failed to parse index.json: {}", e)))?;
        let manifest_desc = index
            .manifests()
            .first()
            .ok_or_else(|| CertError::OciImageError("No manifests in index.json".to_string()))?;
        let manifest_digest = manifest_desc.digest().to_string();

        let manifest_bytes = read_file(&blob_path(&root_dir, &manifest_digest))?;
        let manifest: ImageManifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| CertError::OciImageError(format!("Failed to parse manifest: {}", e)))?;

        let config_digest = manifest.config().digest().to_string();
        let raw_config = read_file(&blob_path(&root_dir, &config_digest))?;
        let config = parse_config(&raw_config)?;

        let layers = manifest
            .layers()
            .iter()
            .map(|layer| LayerBlob {
                digest: layer.digest().to_string(),
                media_type: layer.media_type().to_string(),
                size: u64::try_from(layer.size()).unwrap_or(0),
                path: blob_path(&root_dir, layer.digest()),
            })
            .collect();

        Ok(Self {
            root_dir,
            manifest,
            manifest_digest,
            manifest_size: manifest_bytes.len() as u64,
            config,
            raw_config,
            layers,
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Manifest digest, the image's identity in the registry.
    pub fn digest(&self) -> &str {
        &self.manifest_digest
    }

    /// Config blob digest (the docker image id).
    pub fn config_digest(&self) -> String {
        self.manifest.config().digest().to_string()
    }

    pub fn manifest(&self) -> &ImageManifest {
        &self.manifest
    }

    pub fn config(&self) -> &ImageConfiguration {
        &self.config
    }

    /// Config blob exactly as pulled.
    pub fn raw_config(&self) -> &[u8] {
        &self.raw_config
    }

    /// Layers in order, base first.
    pub fn layers(&self) -> &[LayerBlob] {
        &self.layers
    }

    /// Look up a layer by its compressed digest.
    pub fn layer_by_digest(&self, digest: &str) -> Option<&LayerBlob> {
        self.layers.iter().find(|l| l.digest == digest)
    }

    /// Uncompressed layer digests from the config, base first.
    pub fn diff_ids(&self) -> &[String] {
        self.config.rootfs().diff_ids()
    }

    pub fn labels(&self) -> HashMap<String, String> {
        self.config
            .config()
            .as_ref()
            .and_then(|c| c.labels().clone())
            .unwrap_or_default()
    }

    pub fn user(&self) -> Option<String> {
        self.config.config().as_ref().and_then(|c| c.user().clone())
    }

    pub fn cmd(&self) -> Vec<String> {
        self.config
            .config()
            .as_ref()
            .and_then(|c| c.cmd().clone())
            .unwrap_or_default()
    }

    pub fn architecture(&self) -> String {
        self.config.architecture().to_string()
    }

    pub fn os(&self) -> String {
        self.config.os().to_string()
    }

    pub fn created(&self) -> Option<String> {
        self.config.created().clone()
    }

    /// `docker_version` is not part of the OCI config schema; read it raw.
    pub fn docker_version(&self) -> Option<String> {
        serde_json::from_slice::<serde_json::Value>(&self.raw_config)
            .ok()
            .and_then(|v| v.get("docker_version").and_then(|d| d.as_str()).map(str::to_string))
    }

    /// Compressed image size: manifest, config and layer blobs.
    pub fn size(&self) -> u64 {
        self.manifest_size
            + self.raw_config.len() as u64
            + self.layers.iter().map(|l| l.size).sum::<u64>()
    }

    fn validate_oci_layout(root_dir: &Path) -> Result<()> {
        for required in ["oci-layout", "index.json", "blobs"] {
            if !root_dir.join(required).exists() {
                return Err(CertError::OciImageError(format!(
                    "Not a valid OCI layout: missing {} in {}",
                    required,
                    root_dir.display()
                )));
            }
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        CertError::OciImageError(format!("Failed to read {}: {}", path.display(), e))
    })
}

/// Parse an image config. `history` is optional in the image format but
/// required by some `oci-spec` releases, so a missing one becomes empty.
fn parse_config(raw: &[u8]) -> Result<ImageConfiguration> {
    let parse_error = |e: serde_json::Error| CertError::OciImageError(format!("Failed to parse config: {}", e));
    let mut value: serde_json::Value = serde_json::from_slice(raw).map_err(parse_error)?;
    if let Some(object) = value.as_object_mut() {
        object
            .entry("history")
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
    }
    serde_json::from_value(value).map_err(parse_error)
}

/// Path of a blob in an OCI layout (`blobs/<algorithm>/<hex>`).
pub(crate) fn blob_path(root_dir: &Path, digest: &str) -> PathBuf {
    let (algorithm, hash) = digest.split_once(':').unwrap_or(("sha256", digest));
    root_dir.join("blobs").join(algorithm).join(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{build_layout, LayerSpec};
    use tempfile::TempDir;

    #[test]
    fn test_validate_missing_layout_marker() {
        let dir = TempDir::new().unwrap();
        let err = OciImage::from_path(dir.path()).unwrap_err();
        assert!(err.to_string().contains("oci-layout"));
    }

    #[test]
    fn test_load_layout() {
        let dir = TempDir::new().unwrap();
        let layers = vec![
            LayerSpec::files(&[("etc/os-release", b"ID=test\n")]),
            LayerSpec::files(&[("app/run.sh", b"#!/bin/sh\n")]),
        ];
        let digest = build_layout(
            dir.path(),
            &layers,
            serde_json::json!({"User": "1001", "Labels": {"name": "app"}, "Cmd": ["/app/run.sh"]}),
        );

        let image = OciImage::from_path(dir.path()).unwrap();
        assert_eq!(image.digest(), digest);
        assert_eq!(image.layers().len(), 2);
        assert_eq!(image.diff_ids().len(), 2);
        assert_eq!(image.user().as_deref(), Some("1001"));
        assert_eq!(image.labels().get("name").map(String::as_str), Some("app"));
        assert_eq!(image.cmd(), vec!["/app/run.sh".to_string()]);
        assert_eq!(image.architecture(), "amd64");
        assert_eq!(image.os(), "linux");
        assert!(image.layers().iter().all(|l| l.path.exists()));
        assert!(image.size() > 0);
    }

    #[test]
    fn test_layer_by_digest() {
        let dir = TempDir::new().unwrap();
        build_layout(
            dir.path(),
            &[LayerSpec::files(&[("a", b"a")])],
            serde_json::json!({}),
        );
        let image = OciImage::from_path(dir.path()).unwrap();
        let first = image.layers()[0].digest.clone();
        assert!(image.layer_by_digest(&first).is_some());
        assert!(image.layer_by_digest("sha256:missing").is_none());
    }

    #[test]
    fn test_blob_path() {
        let p = blob_path(Path::new("/img"), "sha256:abc");
        assert_eq!(p, PathBuf::from("/img/blobs/sha256/abc"));
    }

    #[test]
    fn test_config_without_history_parses() {
        let raw = serde_json::to_vec(&serde_json::json!({
            "architecture": "amd64",
            "os": "linux",
            "config": { "User": "1001" },
            "rootfs": { "type": "layers", "diff_ids": ["sha256:aa"] },
        }))
        .unwrap();
        let config = parse_config(&raw).unwrap();
        assert_eq!(config.rootfs().diff_ids().len(), 1);
        assert!(parse_config(b"not json").is_err());
    }
}
