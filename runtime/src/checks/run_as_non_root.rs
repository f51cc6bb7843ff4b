use std::path::Path;

use async_trait::async_trait;
use ccert_core::error::Result;
use ccert_core::{CheckMetadata, HelpText, Level};
use tokio_util::sync::CancellationToken;

use super::{check_error, help, metadata, Check, CheckId};
use crate::materialize::MaterializedImage;
use crate::oci::resolve_in_root;

/// The configured user is set and is not root.
pub struct RunAsNonRoot;

#[async_trait]
impl Check for RunAsNonRoot {
    fn id(&self) -> CheckId {
        CheckId::RunAsNonRoot
    }

    async fn validate(&self, image: &MaterializedImage, _cancel: &CancellationToken) -> Result<bool> {
        let user = image.image().user().unwrap_or_default();
        let user = user.split(':').next().unwrap_or_default().trim();
        if user.is_empty() {
            tracing::info!("Detected user specified in image config is empty, so the image will run as root");
            return Ok(false);
        }

        let uid = match user.parse::<u32>() {
            Ok(uid) => Some(uid),
            Err(_) if user == "root" => Some(0),
            Err(_) => lookup_uid(image.fs_path(), user)
                .await
                .map_err(|e| check_error(self.id(), e))?,
        };
        tracing::debug!(user, uid = ?uid, "Resolved image user");
        Ok(uid != Some(0))
    }

    fn metadata(&self) -> CheckMetadata {
        metadata(
            "Checking if container runs as the root user because a container that does not specify a non-root user will fail the automatic certification, and will be subject to a manual review before the container can be approved for publication",
            Level::Good,
        )
    }

    fn help(&self) -> HelpText {
        help(self.id(), "Indicate a specific USER in the dockerfile or containerfile")
    }
}

/// Look a user name up in the image's `/etc/passwd`.
async fn lookup_uid(root: &Path, user: &str) -> Result<Option<u32>> {
    let path = resolve_in_root(root, Path::new("etc/passwd"))?;
    let passwd = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(passwd.lines().find_map(|line| {
        let mut fields = line.split(':');
        if fields.next()? != user {
            return None;
        }
        fields.nth(1)?.parse().ok()
    }))
}
