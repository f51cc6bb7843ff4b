use async_trait::async_trait;
use ccert_core::error::Result;
use ccert_core::{CheckMetadata, HelpText, Level};
use tokio_util::sync::CancellationToken;

use super::{help, metadata, Check, CheckId};
use crate::materialize::MaterializedImage;

pub const ACCEPTABLE_LAYER_MAX: usize = 40;

/// The image has at most [`ACCEPTABLE_LAYER_MAX`] layers.
pub struct LayerCountAcceptable;

#[async_trait]
impl Check for LayerCountAcceptable {
    fn id(&self) -> CheckId {
        CheckId::LayerCountAcceptable
    }

    async fn validate(&self, image: &MaterializedImage, _cancel: &CancellationToken) -> Result<bool> {
        let count = image.image().layers().len();
        tracing::debug!(layer_count = count, "Number of layers detected in image");
        Ok(count <= ACCEPTABLE_LAYER_MAX)
    }

    fn metadata(&self) -> CheckMetadata {
        metadata(
            format!(
                "Checking if container has less than {} layers.  Too many layers within the container images can degrade container performance.",
                ACCEPTABLE_LAYER_MAX
            ),
            Level::Better,
        )
    }

    fn help(&self) -> HelpText {
        help(
            self.id(),
            "Optimize your Dockerfile to consolidate and minimize the number of layers. Each RUN command will produce a new layer. Try combining RUN commands using && where possible.",
        )
    }
}
