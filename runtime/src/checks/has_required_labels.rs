use async_trait::async_trait;
use ccert_core::error::Result;
use ccert_core::{CheckMetadata, HelpText, Level};
use tokio_util::sync::CancellationToken;

use super::{help, metadata, Check, CheckId};
use crate::materialize::MaterializedImage;

const REQUIRED_LABELS: &[&str] = &["name", "vendor", "version", "release", "summary", "description"];

/// The image config carries every required label with a non-empty value.
pub struct HasRequiredLabel;

#[async_trait]
impl Check for HasRequiredLabel {
    fn id(&self) -> CheckId {
        CheckId::HasRequiredLabel
    }

    async fn validate(&self, image: &MaterializedImage, _cancel: &CancellationToken) -> Result<bool> {
        let labels = image.image().labels();
        let missing: Vec<&str> = REQUIRED_LABELS
            .iter()
            .copied()
            .filter(|label| labels.get(*label).map_or(true, |v| v.is_empty()))
            .collect();

        if !missing.is_empty() {
            tracing::debug!(missing_labels = ?missing, "Expected labels are missing");
        }
        Ok(missing.is_empty())
    }

    fn metadata(&self) -> CheckMetadata {
        metadata(
            "Checking if the required labels (name, vendor, version, release, summary, description) are present in the container metadata.",
            Level::Good,
        )
    }

    fn help(&self) -> HelpText {
        help(
            self.id(),
            "Add the following labels to your Dockerfile or Containerfile: name, vendor, version, release, summary, description",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::fixtures;
    use crate::testutil::LayerSpec;

    async fn run(labels: serde_json::Value) -> bool {
        let image = fixtures::image(
            &[LayerSpec::files(&[("a", b"a")])],
            serde_json::json!({ "Labels": labels }),
            &[],
            None,
        );
        HasRequiredLabel
            .validate(&image, &CancellationToken::new())
            .await
            .unwrap()
    }

    fn all_labels() -> serde_json::Value {
        serde_json::json!({
            "name": "app",
            "vendor": "ACME",
            "version": "1.0",
            "release": "1",
            "summary": "An app",
            "description": "An app that does things",
        })
    }

    #[tokio::test]
    async fn test_all_labels_pass() {
        assert!(run(all_labels()).await);
    }

    #[tokio::test]
    async fn test_missing_label_fails() {
        let mut labels = all_labels();
        labels.as_object_mut().unwrap().remove("vendor");
        assert!(!run(labels).await);
    }

    #[tokio::test]
    async fn test_empty_label_fails() {
        let mut labels = all_labels();
        labels["summary"] = serde_json::json!("");
        assert!(!run(labels).await);
    }
}
