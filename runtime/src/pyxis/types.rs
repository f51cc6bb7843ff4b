//! Wire types of the certification authority API.
//!
//! Field names follow the JSON the service accepts. The same types are
//! written to the artifacts directory and read back for submission.

use serde::{Deserialize, Serialize};

fn is_zero(v: &u64) -> bool {
    *v == 0
}

/// Certification record of one image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertImage {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub certified: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub docker_image_digest: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub docker_image_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub isv_pid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_data: Option<ParsedData>,
    #[serde(default)]
    pub architecture: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw_config: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<Repository>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub sum_layer_size_bytes: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uncompressed_top_layer_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedData {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub architecture: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub docker_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_id: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uncompressed_layer_sizes: Vec<LayerSize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

/// Uncompressed size of one layer, keyed by diff id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSize {
    pub layer_id: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub published: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub push_date: String,
    pub registry: String,
    pub repository: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub added_date: String,
    pub name: String,
}

/// Installed package record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rpm {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub architecture: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gpg: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nvra: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub release: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub srpm_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub srpm_nevra: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpmManifest {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rpms: Vec<Rpm>,
}

/// Container certification project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertProject {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub r#type: String,
    #[serde(default)]
    pub container: Container,
}

impl CertProject {
    /// Whether the project certifies a scratch image.
    pub fn is_scratch(&self) -> bool {
        self.container.os_content_type == SCRATCH_CONTENT_TYPE
    }
}

/// `os_content_type` of scratch projects.
pub const SCRATCH_CONTENT_TYPE: &str = "Scratch Image";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub docker_config_json: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub isv_pid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os_content_type: String,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub hosted_registry: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub registry: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository: String,
}

/// Uploaded file attached to a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub cert_project: String,
    /// Base64 encoded file content
    pub content: String,
    pub content_type: String,
    pub filename: String,
    pub file_size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_id: String,
}

/// Test results document as stored by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub cert_project: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_id: String,
    #[serde(default)]
    pub passed: bool,
    #[serde(default)]
    pub results: serde_json::Value,
    #[serde(default)]
    pub test_library: serde_json::Value,
}

/// Everything one submission sends.
#[derive(Debug, Clone)]
pub struct CertificationInput {
    pub project: CertProject,
    pub cert_image: CertImage,
    /// Raw `results.json` report
    pub test_results: serde_json::Value,
    pub rpm_manifest: Option<RpmManifest>,
    /// Files uploaded alongside the results (the log file)
    pub artifacts: Vec<Artifact>,
}

/// What the service created for a submission.
#[derive(Debug, Clone, Default)]
pub struct CertificationResults {
    pub cert_image: CertImage,
    pub test_results: TestResults,
    pub rpm_manifest: Option<RpmManifest>,
    pub artifacts: Vec<Artifact>,
}
