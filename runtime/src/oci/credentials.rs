//! Registry credentials read from a docker-style `config.json`.
//!
//! The provider is an explicit value handed to the registry client for one
//! run; nothing is cached process-wide.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::Engine;
use ccert_core::error::{CertError, Result};
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use serde::Deserialize;

/// Authentication credentials for a container registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    /// Create anonymous authentication (no credentials).
    pub fn anonymous() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    /// Create basic authentication with username and password.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_none() || self.password.is_none()
    }

    /// Convert to oci-distribution auth type.
    pub(crate) fn to_oci_auth(&self) -> OciRegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => OciRegistryAuth::Basic(u.clone(), p.clone()),
            _ => OciRegistryAuth::Anonymous,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, DockerAuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct DockerAuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Credential provider backed by a docker `config.json`.
///
/// A provider without a path resolves every registry anonymously.
#[derive(Debug, Clone, Default)]
pub struct RegistryCredentials {
    path: Option<PathBuf>,
}

impl RegistryCredentials {
    /// Anonymous provider.
    pub fn anonymous() -> Self {
        Self { path: None }
    }

    /// Provider reading the given docker config file.
    pub fn from_docker_config(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Provider for an optional configured path.
    pub fn from_optional(path: Option<&Path>) -> Self {
        match path {
            Some(p) => Self::from_docker_config(p),
            None => Self::anonymous(),
        }
    }

    pub fn docker_config_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Resolve credentials for a registry host.
    ///
    /// A configured but unreadable or malformed file is an error; a registry
    /// with no entry resolves anonymously.
    pub fn resolve(&self, registry: &str) -> Result<RegistryAuth> {
        let Some(path) = &self.path else {
            return Ok(RegistryAuth::anonymous());
        };
        let file = load(path)?;
        let wanted = normalize_registry(registry);

        let entry = file
            .auths
            .iter()
            .find(|(key, _)| normalize_registry(key) == wanted)
            .map(|(_, entry)| entry);

        match entry {
            Some(entry) => decode_entry(entry, registry),
            None => {
                tracing::debug!(registry, "No credentials in docker config, using anonymous access");
                Ok(RegistryAuth::anonymous())
            }
        }
    }
}

fn load(path: &Path) -> Result<DockerConfigFile> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        CertError::ConfigError(format!(
            "Failed to read docker config {}: {}",
            path.display(),
            e
        ))
    })?;
    serde_json::from_str(&data).map_err(|e| {
        CertError::ConfigError(format!(
            "Failed to parse docker config {}: {}",
            path.display(),
            e
        ))
    })
}

fn decode_entry(entry: &DockerAuthEntry, registry: &str) -> Result<RegistryAuth> {
    if let (Some(u), Some(p)) = (&entry.username, &entry.password) {
        return Ok(RegistryAuth::basic(u, p));
    }
    let Some(encoded) = entry.auth.as_deref().filter(|a| !a.is_empty()) else {
        return Ok(RegistryAuth::anonymous());
    };
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| {
            CertError::ConfigError(format!("Invalid auth entry for {}: {}", registry, e))
        })?;
    let decoded = String::from_utf8(decoded).map_err(|e| {
        CertError::ConfigError(format!("Invalid auth entry for {}: {}", registry, e))
    })?;
    match decoded.split_once(':') {
        Some((user, pass)) => Ok(RegistryAuth::basic(user, pass)),
        None => Err(CertError::ConfigError(format!(
            "Invalid auth entry for {}: expected user:password",
            registry
        ))),
    }
}

/// Normalize registry keys: strip scheme and path, fold Docker Hub aliases.
fn normalize_registry(registry: &str) -> String {
    let r = registry.trim().to_lowercase();
    let r = r
        .strip_prefix("https://")
        .or_else(|| r.strip_prefix("http://"))
        .unwrap_or(&r);
    let host = r.split('/').next().unwrap_or(r);
    match host {
        "docker.io" | "registry-1.docker.io" | "index.docker.io" => "index.docker.io".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_anonymous_provider() {
        let creds = RegistryCredentials::anonymous();
        assert!(creds.resolve("quay.io").unwrap().is_anonymous());
    }

    #[test]
    fn test_resolve_base64_auth() {
        let dir = TempDir::new().unwrap();
        let encoded = base64::engine::general_purpose::STANDARD.encode("robot:s3cret");
        let path = write_config(
            &dir,
            &format!(r#"{{"auths":{{"quay.io":{{"auth":"{}"}}}}}}"#, encoded),
        );
        let auth = RegistryCredentials::from_docker_config(path)
            .resolve("quay.io")
            .unwrap();
        assert_eq!(auth, RegistryAuth::basic("robot", "s3cret"));
    }

    #[test]
    fn test_resolve_docker_hub_alias() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"{"auths":{"https://index.docker.io/v1/":{"username":"u","password":"p"}}}"#,
        );
        let auth = RegistryCredentials::from_docker_config(path)
            .resolve("docker.io")
            .unwrap();
        assert_eq!(auth, RegistryAuth::basic("u", "p"));
    }

    #[test]
    fn test_unknown_registry_is_anonymous() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, r#"{"auths":{}}"#);
        let auth = RegistryCredentials::from_docker_config(path)
            .resolve("ghcr.io")
            .unwrap();
        assert!(auth.is_anonymous());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let creds = RegistryCredentials::from_docker_config(dir.path().join("missing.json"));
        assert!(matches!(
            creds.resolve("quay.io").unwrap_err(),
            CertError::ConfigError(_)
        ));
    }

    #[test]
    fn test_malformed_auth() {
        let dir = TempDir::new().unwrap();
        let encoded = base64::engine::general_purpose::STANDARD.encode("no-colon");
        let path = write_config(
            &dir,
            &format!(r#"{{"auths":{{"quay.io":{{"auth":"{}"}}}}}}"#, encoded),
        );
        let err = RegistryCredentials::from_docker_config(path)
            .resolve("quay.io")
            .unwrap_err();
        assert!(err.to_string().contains("user:password"));
    }

    #[test]
    fn test_to_oci_auth() {
        assert!(matches!(
            RegistryAuth::anonymous().to_oci_auth(),
            OciRegistryAuth::Anonymous
        ));
        assert!(matches!(
            RegistryAuth::basic("u", "p").to_oci_auth(),
            OciRegistryAuth::Basic(_, _)
        ));
    }
}
