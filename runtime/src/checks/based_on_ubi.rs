use std::sync::Arc;

use async_trait::async_trait;
use ccert_core::error::Result;
use ccert_core::{CheckMetadata, HelpText, Level};
use tokio_util::sync::CancellationToken;

use super::{check_error, help, metadata, Check, CheckId};
use crate::materialize::MaterializedImage;
use crate::pyxis::AuthorityClient;

/// Some layer of the image is the top layer of a certified image.
pub struct BasedOnUbi {
    authority: Arc<dyn AuthorityClient>,
}

impl BasedOnUbi {
    pub fn new(authority: Arc<dyn AuthorityClient>) -> Self {
        Self { authority }
    }
}

#[async_trait]
impl Check for BasedOnUbi {
    fn id(&self) -> CheckId {
        CheckId::BasedOnUbi
    }

    async fn validate(&self, image: &MaterializedImage, cancel: &CancellationToken) -> Result<bool> {
        let layers = image.image().diff_ids();
        let certified = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(check_error(self.id(), "cancelled while querying certified images"));
            }
            found = self.authority.find_certified_images_by_layers(layers) => found,
        }
        .map_err(|e| check_error(self.id(), format!("unable to verify layer hashes: {}", e)))?;

        tracing::debug!(matches = certified.len(), "Certified images sharing a layer");
        Ok(!certified.is_empty())
    }

    fn metadata(&self) -> CheckMetadata {
        metadata(
            "Checking if the container's base image is based upon the Red Hat Universal Base Image (UBI)",
            Level::Best,
        )
    }

    fn help(&self) -> HelpText {
        help(
            self.id(),
            "Change the FROM directive in your Dockerfile or Containerfile to FROM registry.access.redhat.com/ubi8/ubi",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::fixtures::{self, StaticAuthority};
    use crate::pyxis::CertImage;
    use crate::testutil::LayerSpec;
    use ccert_core::CertError;

    async fn run(certified: Result<Vec<CertImage>>) -> Result<bool> {
        let image = fixtures::image(&[LayerSpec::files(&[("a", b"a")])], serde_json::json!({}), &[], None);
        BasedOnUbi::new(Arc::new(StaticAuthority { certified }))
            .validate(&image, &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn test_certified_match_passes() {
        assert!(run(Ok(vec![CertImage::default()])).await.unwrap());
    }

    #[tokio::test]
    async fn test_no_match_fails() {
        assert!(!run(Ok(vec![])).await.unwrap());
    }

    #[tokio::test]
    async fn test_authority_failure_errors() {
        let err = run(Err(CertError::Other("401".into()))).await.unwrap_err();
        assert!(matches!(err, CertError::CheckError { .. }));
    }
}
