//! Certification image record and package manifest construction.

use chrono::{DateTime, SecondsFormat, Utc};
use ccert_core::error::{CertError, Result};

use crate::oci::{uncompressed_size, ImageReference, OciImage};
use crate::packages::PackageInfo;
use crate::pyxis::{CertImage, Label, LayerSize, ParsedData, Repository, Rpm, RpmManifest, Tag};

/// Uncompressed size of every layer, keyed by diff id, base first.
///
/// Each layer is decompressed and counted; nothing is kept.
pub fn measure_layer_sizes(image: &OciImage) -> Result<Vec<LayerSize>> {
    let diff_ids = image.diff_ids();
    if diff_ids.len() != image.layers().len() {
        return Err(CertError::OciImageError(format!(
            "Config lists {} diff ids but the manifest has {} layers",
            diff_ids.len(),
            image.layers().len()
        )));
    }
    diff_ids
        .iter()
        .zip(image.layers())
        .map(|(diff_id, layer)| {
            Ok(LayerSize {
                layer_id: diff_id.clone(),
                size_bytes: uncompressed_size(layer)?,
            })
        })
        .collect()
}

/// Build the certification record of a pulled image.
pub fn build_cert_image(
    image: &OciImage,
    reference: &ImageReference,
    layer_sizes: Vec<LayerSize>,
    pushed_at: DateTime<Utc>,
) -> Result<CertImage> {
    let top_layer = image
        .diff_ids()
        .first()
        .cloned()
        .ok_or_else(|| CertError::OciImageError("Image has no layers".to_string()))?;

    let mut labels: Vec<Label> = image
        .labels()
        .into_iter()
        .map(|(name, value)| Label { name, value })
        .collect();
    labels.sort_by(|a, b| a.name.cmp(&b.name));

    let raw_config = String::from_utf8(image.raw_config().to_vec())
        .map_err(|e| CertError::OciImageError(format!("Config is not valid UTF-8: {}", e)))?;
    let digest = image.digest().to_string();
    let added = pushed_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    let sum_layer_size_bytes = layer_sizes.iter().map(|l| l.size_bytes).sum();

    Ok(CertImage {
        docker_image_digest: digest.clone(),
        docker_image_id: image.config_digest(),
        image_id: digest.clone(),
        architecture: image.architecture(),
        parsed_data: Some(ParsedData {
            architecture: image.architecture(),
            command: image.cmd().join(" "),
            created: image.created().unwrap_or_default(),
            docker_version: image.docker_version().unwrap_or_default(),
            image_id: digest,
            labels,
            layers: image.layers().iter().map(|l| l.digest.clone()).collect(),
            os: image.os(),
            size: image.size(),
            uncompressed_layer_sizes: layer_sizes,
        }),
        raw_config,
        repositories: vec![Repository {
            published: false,
            push_date: added.clone(),
            registry: reference.registry.clone(),
            repository: reference.repository.clone(),
            tags: vec![Tag {
                added_date: added,
                name: reference.identifier().to_string(),
            }],
        }],
        sum_layer_size_bytes,
        uncompressed_top_layer_id: top_layer,
        ..Default::default()
    })
}

/// Convert scanned packages into the manifest submitted with the image.
pub fn build_rpm_manifest(packages: &[PackageInfo]) -> RpmManifest {
    RpmManifest {
        rpms: packages.iter().map(to_rpm).collect(),
        ..Default::default()
    }
}

fn to_rpm(pkg: &PackageInfo) -> Rpm {
    let (srpm_name, srpm_nevra) = match pkg.source_rpm.as_deref() {
        Some(source) => {
            let name = source_package_name(source);
            let nevra = format!("{}-{}:{}", name, pkg.epoch, source_version_release(source));
            (name, nevra)
        }
        None => (String::new(), String::new()),
    };
    let gpg = pkg
        .signature
        .as_deref()
        .and_then(|s| s.rsplit_once(", Key ID "))
        .map(|(_, key)| key.to_string())
        .unwrap_or_default();

    Rpm {
        architecture: pkg.arch.clone(),
        gpg,
        name: pkg.name.clone(),
        nvra: format!("{}-{}-{}.{}", pkg.name, pkg.version, pkg.release, pkg.arch),
        release: pkg.release.clone(),
        srpm_name,
        srpm_nevra,
        summary: pkg.summary.clone(),
        version: pkg.version.clone(),
    }
}

/// `bash-5.1.8-6.el9.src.rpm` → `bash`
fn source_package_name(source: &str) -> String {
    let parts: Vec<&str> = source.split('-').collect();
    if parts.len() < 3 {
        return String::new();
    }
    parts[..parts.len() - 2].join("-")
}

/// `bash-5.1.8-6.el9.src.rpm` → `5.1.8-6.el9.src`
fn source_version_release(source: &str) -> &str {
    let bytes = source.as_bytes();
    let start = (0..bytes.len().saturating_sub(1))
        .find(|&i| bytes[i] == b'-' && bytes[i + 1].is_ascii_digit());
    match start {
        Some(i) => source[i + 1..].trim_end_matches(".rpm"),
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{build_layout, LayerSpec};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn bash() -> PackageInfo {
        PackageInfo {
            name: "bash".into(),
            version: "5.1.8".into(),
            release: "6.el9".into(),
            arch: "x86_64".into(),
            epoch: 0,
            source_rpm: Some("bash-5.1.8-6.el9.src.rpm".into()),
            summary: "The GNU Bourne Again shell".into(),
            signature: Some("RSA/SHA256, Tue Feb  1 2022, Key ID 199e2f91fd431d51".into()),
        }
    }

    #[test]
    fn test_rpm_conversion() {
        let rpm = to_rpm(&bash());
        assert_eq!(rpm.srpm_name, "bash");
        assert_eq!(rpm.srpm_nevra, "bash-0:5.1.8-6.el9.src");
        assert_eq!(rpm.gpg, "199e2f91fd431d51");
        assert_eq!(rpm.nvra, "bash-5.1.8-6.el9.x86_64");
    }

    #[test]
    fn test_rpm_with_dashed_source_name() {
        let mut pkg = bash();
        pkg.name = "python3-libs".into();
        pkg.epoch = 1;
        pkg.source_rpm = Some("python3.9-3.9.16-1.el9.src.rpm".into());
        let rpm = to_rpm(&pkg);
        assert_eq!(rpm.srpm_name, "python3.9");
        assert_eq!(rpm.srpm_nevra, "python3.9-1:3.9.16-1.el9.src");
    }

    #[test]
    fn test_rpm_without_source_or_signature() {
        let mut pkg = bash();
        pkg.source_rpm = None;
        pkg.signature = Some("garbage".into());
        let rpm = to_rpm(&pkg);
        assert!(rpm.srpm_name.is_empty());
        assert!(rpm.srpm_nevra.is_empty());
        assert!(rpm.gpg.is_empty());
    }

    #[test]
    fn test_cert_image_from_layout() {
        let dir = TempDir::new().unwrap();
        build_layout(
            dir.path(),
            &[
                LayerSpec::files(&[("etc/os-release", b"ID=rhel\n")]),
                LayerSpec::files(&[("app/bin", b"0123456789")]).uncompressed(),
            ],
            serde_json::json!({"Labels": {"vendor": "ACME", "name": "app"}, "Cmd": ["/app/bin", "--serve"]}),
        );
        let image = OciImage::from_path(dir.path()).unwrap();
        let reference = ImageReference::parse("quay.io/acme/app:v1.0").unwrap();

        let sizes = measure_layer_sizes(&image).unwrap();
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].layer_id, image.diff_ids()[0]);
        assert_eq!(sizes[1].size_bytes, std::fs::metadata(&image.layers()[1].path).unwrap().len());

        let pushed = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let record = build_cert_image(&image, &reference, sizes.clone(), pushed).unwrap();
        assert_eq!(record.docker_image_digest, image.digest());
        assert_eq!(record.uncompressed_top_layer_id, image.diff_ids()[0]);
        assert_eq!(record.sum_layer_size_bytes, sizes.iter().map(|s| s.size_bytes).sum::<u64>());

        let parsed = record.parsed_data.as_ref().unwrap();
        assert_eq!(parsed.command, "/app/bin --serve");
        assert_eq!(parsed.labels[0].name, "name");
        assert_eq!(parsed.layers.len(), 2);

        let repo = &record.repositories[0];
        assert_eq!(repo.registry, "quay.io");
        assert_eq!(repo.repository, "acme/app");
        assert_eq!(repo.tags[0].name, "v1.0");
        assert_eq!(repo.push_date, "2024-05-01T12:00:00Z");
    }
}
