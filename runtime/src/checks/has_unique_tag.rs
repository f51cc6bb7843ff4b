use std::sync::Arc;

use async_trait::async_trait;
use ccert_core::error::Result;
use ccert_core::{CheckMetadata, HelpText, Level};
use tokio_util::sync::CancellationToken;

use super::{check_error, help, metadata, Check, CheckId};
use crate::materialize::MaterializedImage;
use crate::oci::ImageFetcher;

/// The repository carries a tag other than `latest`.
pub struct HasUniqueTag {
    fetcher: Arc<dyn ImageFetcher>,
}

impl HasUniqueTag {
    pub fn new(fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Check for HasUniqueTag {
    fn id(&self) -> CheckId {
        CheckId::HasUniqueTag
    }

    async fn validate(&self, image: &MaterializedImage, cancel: &CancellationToken) -> Result<bool> {
        let tags = self
            .fetcher
            .list_tags(image.reference(), cancel)
            .await
            .map_err(|e| check_error(self.id(), format!("could not list tags: {}", e)))?;
        tracing::debug!(tags = ?tags, "Tags found for repository");
        Ok(tags.iter().any(|tag| tag != "latest"))
    }

    fn metadata(&self) -> CheckMetadata {
        metadata(
            "Checking if container has a tag other than 'latest', so that the image can be uniquely identified.",
            Level::Best,
        )
    }

    fn help(&self) -> HelpText {
        help(
            self.id(),
            "Add a tag to your image. Consider using Semantic Versioning. https://semver.org/",
        )
    }
}
