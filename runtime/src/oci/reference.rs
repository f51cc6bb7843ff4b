//! OCI image reference parsing.
//!
//! Splits references like `quay.io/org/app:v1.0` or
//! `registry.example.com:5000/app@sha256:...` into registry, repository and
//! identifier (tag or digest).

use ccert_core::error::{CertError, Result};

/// Default registry when none is specified.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Default tag when neither tag nor digest is specified.
const DEFAULT_TAG: &str = "latest";

/// Parsed OCI image reference. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname, optionally with port (e.g., "quay.io", "localhost:5000")
    pub registry: String,
    /// Repository path (e.g., "library/nginx", "org/app")
    pub repository: String,
    /// Tag (e.g., "latest", "v1.0")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// - `nginx` → docker.io/library/nginx:latest
    /// - `org/app:v1` → docker.io/org/app:v1
    /// - `quay.io/org/app@sha256:abc...` → digest reference, no tag
    /// - `localhost:5000/app` → port is kept in the registry, tag defaults to latest
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(CertError::OciImageError(
                "Empty image reference".to_string(),
            ));
        }

        let (name_tag, digest) = split_digest(reference)?;
        let (name, tag) = split_tag(name_tag);
        let (registry, repository) = split_registry_repository(name)?;

        let tag = match (tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            (tag, _) => tag.map(str::to_string),
        };

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// The tag or digest identifying the image within its repository.
    ///
    /// A digest wins over a tag when both are present, matching what the
    /// registry resolves.
    pub fn identifier(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }

    /// Whether the image was referenced by digest rather than by tag.
    pub fn is_digest(&self) -> bool {
        self.digest.is_some()
    }

    /// `registry/repository` without tag or digest.
    pub fn repository_reference(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// Reference string in the form the registry client resolves.
    pub fn pull_reference(&self) -> String {
        match &self.digest {
            Some(digest) => format!("{}@{}", self.repository_reference(), digest),
            None => format!("{}:{}", self.repository_reference(), self.identifier()),
        }
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.repository_reference())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

fn split_digest(reference: &str) -> Result<(&str, Option<String>)> {
    let Some((name, digest)) = reference.rsplit_once('@') else {
        return Ok((reference, None));
    };
    match digest.split_once(':') {
        Some((algorithm, hex)) if !algorithm.is_empty() && !hex.is_empty() => {
            Ok((name, Some(digest.to_string())))
        }
        _ => Err(CertError::OciImageError(format!(
            "Invalid digest format in reference '{}': expected algorithm:hex",
            reference
        ))),
    }
}

/// Split the tag off the last path component. A bare `host:port` is not a tag.
fn split_tag(name_tag: &str) -> (&str, Option<&str>) {
    let last_slash = name_tag.rfind('/');
    let last_component = &name_tag[last_slash.map_or(0, |p| p + 1)..];
    let Some(colon) = last_component.rfind(':') else {
        return (name_tag, None);
    };
    let tag = &last_component[colon + 1..];
    if last_slash.is_none() && tag.chars().all(|c| c.is_ascii_digit()) {
        return (name_tag, None);
    }
    let split_at = name_tag.len() - last_component.len() + colon;
    (&name_tag[..split_at], Some(tag))
}

fn split_registry_repository(name: &str) -> Result<(String, String)> {
    if let Some((first, rest)) = name.split_once('/') {
        if first.contains('.') || first.contains(':') || first == "localhost" {
            if rest.is_empty() {
                return Err(CertError::OciImageError(format!(
                    "Empty repository in reference '{}'",
                    name
                )));
            }
            return Ok((first.to_string(), rest.to_string()));
        }
        return Ok((DEFAULT_REGISTRY.to_string(), name.to_string()));
    }
    Ok((DEFAULT_REGISTRY.to_string(), format!("library/{}", name)))
}
