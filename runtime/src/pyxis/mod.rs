//! Certification authority client.
//!
//! [`AuthorityClient`] is the seam the policy resolver, the base image
//! check and the submitter talk through. [`PyxisClient`] implements it over
//! the authority's REST API.

mod types;

pub use types::*;

use std::time::Duration;

use async_trait::async_trait;
use ccert_core::error::{CertError, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Request timeout for authority calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Operations of the remote certification authority.
#[async_trait]
pub trait AuthorityClient: Send + Sync {
    /// Fetch the configured certification project.
    async fn get_project(&self) -> Result<CertProject>;

    /// Certified images whose uncompressed top layer is one of `layer_ids`.
    async fn find_certified_images_by_layers(&self, layer_ids: &[String]) -> Result<Vec<CertImage>>;

    /// Submit a completed certification bundle.
    async fn submit_results(&self, input: &CertificationInput) -> Result<CertificationResults>;
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

/// REST client for the authority API.
pub struct PyxisClient {
    base_url: String,
    api_token: String,
    project_id: String,
    http: reqwest::Client,
}

impl PyxisClient {
    /// Create a client for `host` (e.g. `catalog.redhat.com/api/containers`).
    ///
    /// A host given with an explicit scheme is used as is.
    pub fn new(host: &str, api_token: impl Into<String>, project_id: impl Into<String>) -> Result<Self> {
        let host = host.trim_end_matches('/');
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CertError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            api_token: api_token.into(),
            project_id: project_id.into(),
            http,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn project_url(&self, suffix: &str) -> String {
        self.url(&format!("projects/certification/id/{}{}", self.project_id, suffix))
    }

    async fn execute(&self, operation: &str, request: reqwest::RequestBuilder) -> Result<(StatusCode, String)> {
        let response = request
            .header("X-API-KEY", &self.api_token)
            .send()
            .await
            .map_err(|e| CertError::authority(operation, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CertError::authority(operation, e))?;
        tracing::trace!(operation, %status, "Authority response");
        Ok((status, body))
    }

    async fn call<T: DeserializeOwned>(&self, operation: &str, request: reqwest::RequestBuilder) -> Result<T> {
        let (status, body) = self.execute(operation, request).await?;
        decode(operation, status, &body)
    }

    async fn update_project(&self, project: &CertProject) -> Result<CertProject> {
        // Only the docker config is patched; the rest of the record is owned by the service.
        let patch = serde_json::json!({
            "container": { "docker_config_json": project.container.docker_config_json }
        });
        self.call("update project", self.http.patch(self.project_url("")).json(&patch))
            .await
    }

    async fn create_image(&self, image: &CertImage) -> Result<CertImage> {
        let (status, body) = self
            .execute("create image", self.http.post(self.url("images")).json(image))
            .await?;
        if status == StatusCode::CONFLICT {
            tracing::debug!(digest = %image.docker_image_digest, "Image already exists, looking it up");
            return self.find_image_by_digest(&image.docker_image_digest).await;
        }
        decode("create image", status, &body)
    }

    async fn find_image_by_digest(&self, digest: &str) -> Result<CertImage> {
        let filter = format!("docker_image_digest=={};deleted==false", digest);
        let page: Page<CertImage> = self
            .call(
                "find image",
                self.http.get(self.url("images")).query(&[("filter", filter)]),
            )
            .await?;
        page.data
            .into_iter()
            .next()
            .ok_or_else(|| CertError::authority("find image", format!("no image with digest {}", digest)))
    }

    async fn create_rpm_manifest(&self, manifest: &RpmManifest) -> Result<RpmManifest> {
        let url = self.url(&format!("images/id/{}/rpm-manifest", manifest.image_id));
        let (status, body) = self
            .execute("create rpm manifest", self.http.post(&url).json(manifest))
            .await?;
        if status == StatusCode::CONFLICT {
            return self.call("get rpm manifest", self.http.get(&url)).await;
        }
        decode("create rpm manifest", status, &body)
    }

    async fn create_artifact(&self, artifact: &Artifact) -> Result<Artifact> {
        self.call(
            "create artifact",
            self.http.post(self.project_url("/artifacts")).json(artifact),
        )
        .await
    }

    async fn create_test_results(&self, results: &TestResults) -> Result<TestResults> {
        self.call(
            "create test results",
            self.http.post(self.project_url("/test-results")).json(results),
        )
        .await
    }
}

#[async_trait]
impl AuthorityClient for PyxisClient {
    async fn get_project(&self) -> Result<CertProject> {
        tracing::debug!(project = %self.project_id, "Fetching certification project");
        self.call("get project", self.http.get(self.project_url("")))
            .await
    }

    async fn find_certified_images_by_layers(&self, layer_ids: &[String]) -> Result<Vec<CertImage>> {
        let filter = format!(
            "uncompressed_top_layer_id=in=({});certified==true;deleted==false",
            layer_ids.join(",")
        );
        let page: Page<CertImage> = self
            .call(
                "find images by layer",
                self.http.get(self.url("images")).query(&[("filter", filter)]),
            )
            .await?;
        Ok(page.data)
    }

    async fn submit_results(&self, input: &CertificationInput) -> Result<CertificationResults> {
        let project = if input.project.container.docker_config_json.is_empty() {
            input.project.clone()
        } else {
            self.update_project(&input.project).await?
        };

        let mut cert_image = input.cert_image.clone();
        cert_image.isv_pid = project.container.isv_pid.clone();
        cert_image.certified = input
            .test_results
            .get("passed")
            .and_then(|p| p.as_bool())
            .unwrap_or(false);
        let cert_image = self.create_image(&cert_image).await?;
        let image_id = cert_image.id.clone().unwrap_or_default();
        tracing::debug!(image_id = %image_id, "Created certification image");

        let rpm_manifest = match &input.rpm_manifest {
            Some(manifest) => {
                let mut manifest = manifest.clone();
                manifest.image_id = image_id.clone();
                Some(self.create_rpm_manifest(&manifest).await?)
            }
            None => None,
        };

        let mut artifacts = Vec::with_capacity(input.artifacts.len());
        for artifact in &input.artifacts {
            let mut artifact = artifact.clone();
            artifact.cert_project = self.project_id.clone();
            artifact.image_id = image_id.clone();
            artifacts.push(self.create_artifact(&artifact).await?);
        }

        let test_results = TestResults {
            id: None,
            cert_project: self.project_id.clone(),
            image: input
                .test_results
                .get("image")
                .and_then(|i| i.as_str())
                .unwrap_or_default()
                .to_string(),
            image_id: image_id.clone(),
            passed: cert_image.certified,
            results: input.test_results.get("results").cloned().unwrap_or_default(),
            test_library: input
                .test_results
                .get("test_library")
                .cloned()
                .unwrap_or_default(),
        };
        let test_results = self.create_test_results(&test_results).await?;

        Ok(CertificationResults {
            cert_image,
            test_results,
            rpm_manifest,
            artifacts,
        })
    }
}

fn decode<T: DeserializeOwned>(operation: &str, status: StatusCode, body: &str) -> Result<T> {
    if !status.is_success() {
        return Err(CertError::authority(operation, format!("{}: {}", status, body.trim())));
    }
    serde_json::from_str(body)
        .map_err(|e| CertError::authority(operation, format!("invalid response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the raw request.
    async fn one_shot_server(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (format!("http://{}/api/containers", addr), handle)
    }

    #[test]
    fn test_url_building() {
        let client = PyxisClient::new("catalog.redhat.com/api/containers/", "t", "p1").unwrap();
        assert_eq!(
            client.project_url("/test-results"),
            "https://catalog.redhat.com/api/containers/v1/projects/certification/id/p1/test-results"
        );
        assert_eq!(
            client.url("images"),
            "https://catalog.redhat.com/api/containers/v1/images"
        );
    }

    #[test]
    fn test_decode_error_status() {
        let err = decode::<CertProject>("get project", StatusCode::UNAUTHORIZED, "denied").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Authority error: get project - 401 Unauthorized: denied"
        );
    }

    #[tokio::test]
    async fn test_get_project_sends_api_key() {
        let (host, server) = one_shot_server(
            "200 OK",
            r#"{"_id":"p1","name":"app","container":{"privileged":true,"hosted_registry":false}}"#,
        )
        .await;
        let client = PyxisClient::new(&host, "secret-token", "p1").unwrap();

        let project = client.get_project().await.unwrap();
        assert_eq!(project.id, "p1");
        assert!(project.container.privileged);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/containers/v1/projects/certification/id/p1 "));
        assert!(request.to_lowercase().contains("x-api-key: secret-token"));
    }

    #[tokio::test]
    async fn test_find_images_by_layers() {
        let (host, server) = one_shot_server(
            "200 OK",
            r#"{"data":[{"_id":"img1","certified":true,"architecture":"amd64"}],"page":0,"total":1}"#,
        )
        .await;
        let client = PyxisClient::new(&host, "t", "p1").unwrap();

        let images = client
            .find_certified_images_by_layers(&["sha256:aaa".to_string()])
            .await
            .unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].id.as_deref(), Some("img1"));

        let request = server.await.unwrap();
        assert!(request.contains("filter=uncompressed_top_layer_id"));
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let client = PyxisClient::new("http://127.0.0.1:1", "t", "p1").unwrap();
        let err = client.get_project().await.unwrap_err();
        assert!(matches!(err, CertError::AuthorityError { .. }));
    }
}
