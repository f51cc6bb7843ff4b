use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use ccert_core::error::Result;
use ccert_core::{CheckMetadata, HelpText, Level};
use tokio_util::sync::CancellationToken;

use super::{check_error, help, metadata, Check, CheckId};
use crate::materialize::MaterializedImage;
use crate::oci::resolve_in_root;

const LICENSES_DIR: &str = "licenses";

/// `/licenses` exists and holds at least one file, directly or through a link.
pub struct HasLicense;

#[async_trait]
impl Check for HasLicense {
    fn id(&self) -> CheckId {
        CheckId::HasLicense
    }

    async fn validate(&self, image: &MaterializedImage, _cancel: &CancellationToken) -> Result<bool> {
        let root = image.fs_path();
        let dir = resolve_in_root(root, Path::new(LICENSES_DIR))?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                tracing::debug!("License directory not found");
                return Ok(false);
            }
            Err(e) => return Err(check_error(self.id(), format!("could not read {}: {}", dir.display(), e))),
        };

        let mut files = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            let relative = entry.path().strip_prefix(root).map(Path::to_path_buf).unwrap_or_default();
            let target = resolve_in_root(root, &relative)?;
            if tokio::fs::metadata(&target).await.is_ok_and(|m| m.is_file()) {
                files += 1;
            }
        }
        tracing::debug!(files, "Files found in license directory");
        Ok(files > 0)
    }

    fn metadata(&self) -> CheckMetadata {
        metadata(
            "Checking if terms and conditions applicable to the software including open source licensing information are present.",
            Level::Best,
        )
    }

    fn help(&self) -> HelpText {
        help(
            self.id(),
            "Create a directory named /licenses and include all relevant licensing and/or terms and conditions as text file(s) in that directory.",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::fixtures;
    use crate::testutil::LayerSpec;

    async fn run(files: &[(&str, &[u8])]) -> Result<bool> {
        let image = fixtures::image(&[LayerSpec::files(&[("a", b"a")])], serde_json::json!({}), files, None);
        HasLicense.validate(&image, &CancellationToken::new()).await
    }

    #[tokio::test]
    async fn test_license_file_present() {
        assert!(run(&[("licenses/LICENSE", b"Apache-2.0")]).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_directory_fails() {
        assert!(!run(&[("etc/motd", b"hi")]).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_directory_fails() {
        // only a nested directory, no files directly inside
        assert!(!run(&[("licenses/sub/.keep", b"")]).await.unwrap());
    }

    #[tokio::test]
    async fn test_linked_license_file_counts() {
        let image = fixtures::image(
            &[LayerSpec::files(&[("a", b"a")])],
            serde_json::json!({}),
            &[("usr/share/doc/app/LICENSE", b"MIT")],
            None,
        );
        let licenses = image.fs_path().join(LICENSES_DIR);
        std::fs::create_dir(&licenses).unwrap();
        std::os::unix::fs::symlink("/usr/share/doc/app/LICENSE", licenses.join("LICENSE")).unwrap();

        assert!(HasLicense.validate(&image, &CancellationToken::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_dangling_license_link_fails() {
        let image = fixtures::image(&[LayerSpec::files(&[("a", b"a")])], serde_json::json!({}), &[], None);
        let licenses = image.fs_path().join(LICENSES_DIR);
        std::fs::create_dir(&licenses).unwrap();
        // resolves inside the image, where nothing exists, even if the host has /etc/hostname
        std::os::unix::fs::symlink("/etc/hostname", licenses.join("LICENSE")).unwrap();

        assert!(!HasLicense.validate(&image, &CancellationToken::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_licenses_is_a_file() {
        assert!(!run(&[("licenses", b"MIT")]).await.unwrap());
    }
}
