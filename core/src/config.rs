use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CertError, Result};

/// Default certification authority host (production).
pub const DEFAULT_PYXIS_HOST: &str = "catalog.redhat.com/api/containers";

/// Default certification authority environment.
pub const DEFAULT_PYXIS_ENV: &str = "prod";

/// Default artifacts directory.
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// Default log file, submitted alongside the results.
pub const DEFAULT_LOG_FILE: &str = "preflight.log";

/// Certification run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CertConfig {
    /// Path to a docker `config.json` holding registry credentials
    pub docker_config: Option<PathBuf>,

    /// Target architecture (e.g. "amd64", "linux/arm64")
    pub platform: String,

    /// API token for the certification authority
    pub pyxis_api_token: Option<String>,

    /// Certification project identifier
    pub certification_project_id: Option<String>,

    /// Authority host override
    pub pyxis_host: Option<String>,

    /// Authority environment, used to derive a host when no override is set
    pub pyxis_env: String,

    /// Directory receiving the JSON artifacts
    pub artifacts: PathBuf,

    /// Log file written during the run
    pub logfile: PathBuf,

    /// Log level
    pub loglevel: LogLevel,

    /// Skip TLS verification against the registry
    pub insecure: bool,
}

impl Default for CertConfig {
    fn default() -> Self {
        Self {
            docker_config: None,
            platform: default_platform().to_string(),
            pyxis_api_token: None,
            certification_project_id: None,
            pyxis_host: None,
            pyxis_env: DEFAULT_PYXIS_ENV.to_string(),
            artifacts: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            logfile: PathBuf::from(DEFAULT_LOG_FILE),
            loglevel: LogLevel::Info,
            insecure: false,
        }
    }
}

impl CertConfig {
    /// Load configuration from a YAML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CertError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Resolve the authority host: explicit override, else derived from the environment.
    pub fn pyxis_host(&self) -> String {
        match self.pyxis_host.as_deref() {
            Some(host) if !host.trim().is_empty() => host.trim().to_string(),
            _ => pyxis_host_for_env(&self.pyxis_env),
        }
    }

    /// Project id with the legacy `ospid-` prefix removed.
    pub fn project_id(&self) -> Option<String> {
        self.certification_project_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| id.strip_prefix("ospid-").unwrap_or(id).to_string())
    }

    /// API token, if one was supplied.
    pub fn api_token(&self) -> Option<&str> {
        self.pyxis_api_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Whether enough is configured to talk to the certification authority.
    pub fn has_authority_credentials(&self) -> bool {
        self.api_token().is_some() && self.project_id().is_some()
    }
}

/// Map an authority environment name to its API host.
pub fn pyxis_host_for_env(env: &str) -> String {
    match env.trim() {
        "uat" | "qa" | "stage" => format!("catalog.{}.redhat.com/api/containers", env.trim()),
        _ => DEFAULT_PYXIS_HOST.to_string(),
    }
}

/// Architecture name of the host in OCI terms.
pub fn default_platform() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64le",
        other => other,
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("unknown log level: '{}'", s)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = CertConfig::default();
        assert_eq!(config.pyxis_env, "prod");
        assert_eq!(config.pyxis_host(), DEFAULT_PYXIS_HOST);
        assert_eq!(config.artifacts, PathBuf::from("artifacts"));
        assert!(!config.insecure);
        assert!(!config.has_authority_credentials());
    }

    #[test]
    fn test_host_derived_from_env() {
        let config = CertConfig {
            pyxis_env: "uat".to_string(),
            ..Default::default()
        };
        assert_eq!(config.pyxis_host(), "catalog.uat.redhat.com/api/containers");
        assert_eq!(pyxis_host_for_env("bogus"), DEFAULT_PYXIS_HOST);
    }

    #[test]
    fn test_host_override_wins() {
        let config = CertConfig {
            pyxis_env: "qa".to_string(),
            pyxis_host: Some("localhost:8080/api".to_string()),
            ..Default::default()
        };
        assert_eq!(config.pyxis_host(), "localhost:8080/api");
    }

    #[test]
    fn test_project_id_prefix_stripped() {
        let config = CertConfig {
            certification_project_id: Some("ospid-abc123".to_string()),
            ..Default::default()
        };
        assert_eq!(config.project_id().as_deref(), Some("abc123"));
    }

    #[test]
    fn test_blank_credentials_are_absent() {
        let config = CertConfig {
            pyxis_api_token: Some("  ".to_string()),
            certification_project_id: Some("p1".to_string()),
            ..Default::default()
        };
        assert!(!config.has_authority_credentials());
    }

    #[test]
    fn test_from_file_partial_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "platform: arm64\npyxis_api_token: tok\ncertification_project_id: p1\nloglevel: debug\n",
        )
        .unwrap();
        let config = CertConfig::from_file(&path).unwrap();
        assert_eq!(config.platform, "arm64");
        assert_eq!(config.loglevel, LogLevel::Debug);
        assert!(config.has_authority_credentials());
        assert_eq!(config.pyxis_env, "prod");
    }

    #[test]
    fn test_from_file_missing() {
        let dir = TempDir::new().unwrap();
        let err = CertConfig::from_file(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, CertError::ConfigError(_)));
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(tracing::Level::from(LogLevel::Trace), tracing::Level::TRACE);
    }
}
