//! Submission of a completed run to the certification authority.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine as _;
use ccert_core::error::{CertError, Result};
use ccert_core::Policy;
use serde::de::DeserializeOwned;

use crate::artifacts::{ArtifactWriter, CERT_IMAGE_FILENAME, RESULTS_FILENAME, RPM_MANIFEST_FILENAME};
use crate::pyxis::{Artifact, AuthorityClient, CertImage, CertificationInput, RpmManifest};

/// Certification portal project page.
pub fn connect_url(pyxis_env: &str, project_id: &str) -> String {
    let env = pyxis_env.trim();
    if env.is_empty() || env == "prod" {
        format!("https://connect.redhat.com/projects/{}", project_id)
    } else {
        format!("https://connect.{}.redhat.com/projects/{}", env, project_id)
    }
}

pub fn scan_results_url(connect_url: &str, image_id: &str) -> String {
    format!("{}/images/{}/scan-results", connect_url, image_id)
}

pub fn overview_url(connect_url: &str) -> String {
    format!("{}/overview", connect_url)
}

/// Packages the artifacts of a run and posts them.
pub struct Submitter {
    authority: Arc<dyn AuthorityClient>,
    artifacts: ArtifactWriter,
    log_file: PathBuf,
    docker_config: Option<PathBuf>,
    project_id: String,
    pyxis_env: String,
}

impl Submitter {
    pub fn new(
        authority: Arc<dyn AuthorityClient>,
        artifacts: ArtifactWriter,
        log_file: impl Into<PathBuf>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            authority,
            artifacts,
            log_file: log_file.into(),
            docker_config: None,
            project_id: project_id.into(),
            pyxis_env: ccert_core::config::DEFAULT_PYXIS_ENV.to_string(),
        }
    }

    /// Docker config attached to the project so the authority can pull the image.
    pub fn with_docker_config(mut self, path: Option<PathBuf>) -> Self {
        self.docker_config = path;
        self
    }

    pub fn with_pyxis_env(mut self, env: impl Into<String>) -> Self {
        self.pyxis_env = env.into();
        self
    }

    /// Files that must be on disk before anything is sent.
    fn required_files(&self, policy: Policy) -> Vec<PathBuf> {
        let mut files = vec![
            self.artifacts.path(CERT_IMAGE_FILENAME),
            self.artifacts.path(RESULTS_FILENAME),
            self.log_file.clone(),
        ];
        if policy.has_package_manifest() {
            files.push(self.artifacts.path(RPM_MANIFEST_FILENAME));
        }
        files
    }

    /// Submit the run's artifacts. Returns the id of the image record.
    pub async fn submit(&self, policy: Policy) -> Result<String> {
        for file in self.required_files(policy) {
            if !file.is_file() {
                return Err(CertError::MissingArtifact(file.display().to_string()));
            }
        }

        let mut project = self.authority.get_project().await.map_err(|e| {
            CertError::SubmissionError(format!("could not retrieve project: {}", e))
        })?;
        tracing::debug!(project = %project.id, "Certification project");

        project.container.docker_config_json = match (&self.docker_config, project.container.hosted_registry) {
            (Some(path), false) => tokio::fs::read_to_string(path).await.map_err(|e| {
                CertError::SubmissionError(format!(
                    "could not read docker config {}: {}",
                    path.display(),
                    e
                ))
            })?,
            _ => String::new(),
        };

        let cert_image: CertImage = read_json(&self.artifacts.path(CERT_IMAGE_FILENAME)).await?;
        let test_results: serde_json::Value = read_json(&self.artifacts.path(RESULTS_FILENAME)).await?;
        let rpm_manifest: Option<RpmManifest> = if policy.has_package_manifest() {
            Some(read_json(&self.artifacts.path(RPM_MANIFEST_FILENAME)).await?)
        } else {
            None
        };
        let log = log_artifact(&self.log_file, &self.project_id).await?;

        let input = CertificationInput {
            project,
            cert_image,
            test_results,
            rpm_manifest,
            artifacts: vec![log],
        };
        let submitted = self
            .authority
            .submit_results(&input)
            .await
            .map_err(|e| CertError::SubmissionError(format!("could not submit to the authority: {}", e)))?;

        let image_id = submitted.cert_image.id.unwrap_or_default();
        let connect = connect_url(&self.pyxis_env, &self.project_id);
        tracing::info!("Test results have been submitted to Red Hat.");
        tracing::info!("These results will be reviewed by Red Hat for final certification.");
        tracing::info!("The container's image id is: {}.", image_id);
        tracing::info!(
            "Please check {} to view scan results.",
            scan_results_url(&connect, &image_id)
        );
        tracing::info!(
            "Please visit {} to view the status of your certification project.",
            overview_url(&connect)
        );
        Ok(image_id)
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path).await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| CertError::SubmissionError(format!("could not parse {}: {}", path.display(), e)))
}

async fn log_artifact(path: &Path, project_id: &str) -> Result<Artifact> {
    let content = tokio::fs::read(path).await?;
    Ok(Artifact {
        id: None,
        cert_project: project_id.to_string(),
        content: base64::engine::general_purpose::STANDARD.encode(&content),
        content_type: "text/plain".to_string(),
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        file_size: content.len() as u64,
        image_id: String::new(),
    })
}
