//! Artifact files written during a run.

use std::path::{Path, PathBuf};

use ccert_core::error::{CertError, Result};
use serde::Serialize;

pub const CERT_IMAGE_FILENAME: &str = "cert-image.json";
pub const RPM_MANIFEST_FILENAME: &str = "rpm-manifest.json";
pub const RESULTS_FILENAME: &str = "results.json";

/// Writes artifacts into one directory as human-readable JSON.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    /// Create the writer, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            CertError::ConfigError(format!(
                "Failed to create artifacts directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of an artifact, whether or not it exists yet.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Serialize `value` with four-space indentation into `name`.
    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        value.serialize(&mut ser)?;

        let path = self.path(name);
        std::fs::write(&path, &buf)?;
        tracing::trace!(file = %path.display(), "Artifact written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_creates_directory() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("nested/artifacts")).unwrap();
        assert!(writer.dir().is_dir());
    }

    #[test]
    fn test_write_json_is_indented() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path()).unwrap();
        let path = writer
            .write_json(RESULTS_FILENAME, &serde_json::json!({"passed": true}))
            .unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "{\n    \"passed\": true\n}");
    }
}
