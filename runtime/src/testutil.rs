//! Fixtures for building OCI image layouts on disk.
//!
//! Only depends on external crates so integration tests can include it by path.

#![allow(dead_code)]

use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

/// One entry in a fixture layer.
pub enum Entry {
    File(String, Vec<u8>),
    Dir(String),
    Symlink(String, String),
}

/// A fixture layer: entries plus whether the blob is gzip-compressed.
pub struct LayerSpec {
    pub entries: Vec<Entry>,
    pub gzip: bool,
    /// Prebuilt tar used instead of `entries`.
    pub raw: Option<Vec<u8>>,
}

impl LayerSpec {
    pub fn files(files: &[(&str, &[u8])]) -> Self {
        Self {
            entries: files
                .iter()
                .map(|(name, data)| Entry::File(name.to_string(), data.to_vec()))
                .collect(),
            gzip: true,
            raw: None,
        }
    }

    pub fn raw(tar: Vec<u8>) -> Self {
        Self {
            entries: Vec::new(),
            gzip: true,
            raw: Some(tar),
        }
    }

    pub fn with(mut self, entry: Entry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn uncompressed(mut self) -> Self {
        self.gzip = false;
        self
    }
}

/// Build an uncompressed tar from entries.
pub fn tar_bytes(entries: &[Entry]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for entry in entries {
        match entry {
            Entry::File(name, data) => {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(tar::EntryType::Regular);
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                builder.append_data(&mut header, name, data.as_slice()).unwrap();
            }
            Entry::Dir(name) => {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
                header.set_mode(0o755);
                builder.append_data(&mut header, name, std::io::empty()).unwrap();
            }
            Entry::Symlink(name, target) => {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_size(0);
                header.set_mode(0o777);
                builder.append_link(&mut header, name, target).unwrap();
            }
        }
    }
    builder.into_inner().unwrap()
}

/// Build a raw tar whose single entry name is written verbatim, bypassing
/// the `tar` crate's path validation (for traversal fixtures).
pub fn raw_tar_with_name(name: &str, data: &[u8]) -> Vec<u8> {
    let mut header = tar::Header::new_old();
    {
        let bytes = header.as_old_mut();
        bytes.name[..name.len()].copy_from_slice(name.as_bytes());
    }
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    let mut out = Vec::new();
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(data);
    let pad = (512 - data.len() % 512) % 512;
    out.extend(std::iter::repeat(0u8).take(pad));
    out.extend(std::iter::repeat(0u8).take(1024));
    out
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

fn write_blob(root: &Path, data: &[u8]) -> String {
    let digest = sha256_digest(data);
    let hex = digest.trim_start_matches("sha256:");
    std::fs::write(root.join("blobs").join("sha256").join(hex), data).unwrap();
    digest
}

/// Write an OCI layout with the given layers and runtime config section.
/// Returns the manifest digest.
pub fn build_layout(root: &Path, layers: &[LayerSpec], runtime_config: serde_json::Value) -> String {
    std::fs::create_dir_all(root.join("blobs").join("sha256")).unwrap();

    let mut diff_ids = Vec::new();
    let mut descriptors = Vec::new();
    for layer in layers {
        let raw = layer.raw.clone().unwrap_or_else(|| tar_bytes(&layer.entries));
        diff_ids.push(sha256_digest(&raw));
        let (blob, media_type) = if layer.gzip {
            (gzip(&raw), "application/vnd.oci.image.layer.v1.tar+gzip")
        } else {
            (raw, "application/vnd.oci.image.layer.v1.tar")
        };
        let digest = write_blob(root, &blob);
        descriptors.push(serde_json::json!({
            "mediaType": media_type,
            "digest": digest,
            "size": blob.len(),
        }));
    }

    let history: Vec<_> = (0..layers.len())
        .map(|i| serde_json::json!({ "created": "2024-01-01T00:00:00Z", "created_by": format!("layer {i}") }))
        .collect();
    let config = serde_json::json!({
        "architecture": "amd64",
        "os": "linux",
        "created": "2024-01-01T00:00:00Z",
        "docker_version": "24.0.0",
        "config": runtime_config,
        "rootfs": { "type": "layers", "diff_ids": diff_ids },
        "history": history,
    });
    let config_bytes = serde_json::to_vec(&config).unwrap();
    let config_digest = write_blob(root, &config_bytes);

    let manifest = serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "config": {
            "mediaType": "application/vnd.oci.image.config.v1+json",
            "digest": config_digest,
            "size": config_bytes.len(),
        },
        "layers": descriptors,
    });
    let manifest_bytes = serde_json::to_vec(&manifest).unwrap();
    let manifest_digest = write_blob(root, &manifest_bytes);

    let index = serde_json::json!({
        "schemaVersion": 2,
        "manifests": [{
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "digest": manifest_digest,
            "size": manifest_bytes.len(),
        }],
    });
    std::fs::write(root.join("index.json"), serde_json::to_vec(&index).unwrap()).unwrap();
    std::fs::write(root.join("oci-layout"), r#"{"imageLayoutVersion":"1.0.0"}"#).unwrap();

    manifest_digest
}
