//! Certification plugins exposed to the command line.
//!
//! Three plugins share one implementation and differ in how the policy is
//! chosen and whether they may submit.

use std::sync::Arc;

use async_trait::async_trait;
use ccert_core::error::{CertError, Result};
use ccert_core::{CertConfig, Policy, RunResult};
use tokio_util::sync::CancellationToken;

use crate::artifacts::ArtifactWriter;
use crate::checks::CheckDeps;
use crate::engine::{CertificationEngine, PolicySource};
use crate::oci::{Platform, RegistryCredentials, RegistryPuller};
use crate::packages::RpmScanner;
use crate::pyxis::PyxisClient;
use crate::submit::Submitter;

/// A certification flow the CLI can run.
#[async_trait]
pub trait CertificationPlugin: Send {
    /// Command name, e.g. `check-container`.
    fn name(&self) -> &'static str;

    /// Human readable title.
    fn title(&self) -> &'static str;

    /// Bind configuration and positional arguments.
    fn init(&mut self, config: CertConfig, args: &[String]) -> Result<()>;

    async fn execute_checks(&mut self, cancel: &CancellationToken) -> Result<()>;

    fn results(&self) -> Option<&RunResult>;

    async fn submit(&mut self, cancel: &CancellationToken) -> Result<()>;
}

/// Which container policy flow a plugin runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerPolicyKind {
    /// Policy from the certification project; may submit.
    Dynamic,
    RootException,
    ScratchException,
}

/// Real collaborators for a configuration.
pub fn deps_from_config(config: &CertConfig) -> Result<CheckDeps> {
    let platform: Platform = config.platform.parse()?;
    let credentials = RegistryCredentials::from_optional(config.docker_config.as_deref());
    let authority = PyxisClient::new(
        &config.pyxis_host(),
        config.api_token().unwrap_or_default(),
        config.project_id().unwrap_or_default(),
    )?;
    Ok(CheckDeps {
        fetcher: Arc::new(RegistryPuller::new(credentials, platform, config.insecure)),
        scanner: Arc::new(RpmScanner::default()),
        authority: Arc::new(authority),
    })
}

/// Container certification plugin.
pub struct ContainerPlugin {
    kind: ContainerPolicyKind,
    deps: Option<CheckDeps>,
    config: CertConfig,
    image: String,
    engine: Option<CertificationEngine>,
}

impl ContainerPlugin {
    pub fn new(kind: ContainerPolicyKind) -> Self {
        Self {
            kind,
            deps: None,
            config: CertConfig::default(),
            image: String::new(),
            engine: None,
        }
    }

    /// Use these collaborators instead of building them from the configuration.
    pub fn with_deps(mut self, deps: CheckDeps) -> Self {
        self.deps = Some(deps);
        self
    }

    /// All registered plugins.
    pub fn all() -> Vec<Box<dyn CertificationPlugin>> {
        [
            ContainerPolicyKind::Dynamic,
            ContainerPolicyKind::RootException,
            ContainerPolicyKind::ScratchException,
        ]
        .into_iter()
        .map(|kind| Box::new(Self::new(kind)) as Box<dyn CertificationPlugin>)
        .collect()
    }

    pub fn engine(&self) -> Option<&CertificationEngine> {
        self.engine.as_ref()
    }

    fn policy_source(&self) -> PolicySource {
        match self.kind {
            ContainerPolicyKind::Dynamic => PolicySource::Project {
                has_credentials: self.config.has_authority_credentials(),
            },
            ContainerPolicyKind::RootException => PolicySource::Fixed(Policy::RootException),
            ContainerPolicyKind::ScratchException => PolicySource::Fixed(Policy::Scratch),
        }
    }
}

#[async_trait]
impl CertificationPlugin for ContainerPlugin {
    fn name(&self) -> &'static str {
        match self.kind {
            ContainerPolicyKind::Dynamic => "check-container",
            ContainerPolicyKind::RootException => "check-container-root-exception-policy",
            ContainerPolicyKind::ScratchException => "check-container-scratch-exception-policy",
        }
    }

    fn title(&self) -> &'static str {
        match self.kind {
            ContainerPolicyKind::Dynamic => "Container Certification",
            ContainerPolicyKind::RootException => "Container Certification (Root Exception)",
            ContainerPolicyKind::ScratchException => "Container Certification (Scratch Exception)",
        }
    }

    fn init(&mut self, config: CertConfig, args: &[String]) -> Result<()> {
        let [image] = args else {
            return Err(CertError::ConfigError(
                "a single argument is required (the container image to test)".to_string(),
            ));
        };
        self.image = image.clone();

        let deps = match self.deps.take() {
            Some(deps) => deps,
            None => deps_from_config(&config)?,
        };
        let artifacts = ArtifactWriter::new(&config.artifacts)?;
        self.config = config;
        self.engine = Some(CertificationEngine::new(deps.clone(), artifacts, self.policy_source()));
        self.deps = Some(deps);
        Ok(())
    }

    async fn execute_checks(&mut self, cancel: &CancellationToken) -> Result<()> {
        tracing::info!(plugin = %self.title(), image = %self.image, "Running checks");
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| CertError::Other("plugin was not initialized".to_string()))?;
        engine.execute(&self.image, cancel).await?;
        Ok(())
    }

    fn results(&self) -> Option<&RunResult> {
        self.engine.as_ref().and_then(|e| e.result())
    }

    async fn submit(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.kind != ContainerPolicyKind::Dynamic {
            tracing::info!(
                "Submission is not allowed for this plugin. Please use the container-certification plugin for submission."
            );
            return Ok(());
        }
        let (engine, deps) = match (self.engine.as_mut(), self.deps.as_ref()) {
            (Some(engine), Some(deps)) => (engine, deps),
            _ => return Err(CertError::Other("plugin was not initialized".to_string())),
        };
        let policy = engine.policy().ok_or_else(|| {
            CertError::SubmissionError("checks have not been executed".to_string())
        })?;
        let project_id = self.config.project_id().ok_or_else(|| {
            CertError::ConfigError("a certification project id is required to submit".to_string())
        })?;
        if self.config.api_token().is_none() {
            return Err(CertError::ConfigError(
                "a pyxis API token is required to submit".to_string(),
            ));
        }

        let submitter = Submitter::new(
            deps.authority.clone(),
            engine.artifacts().clone(),
            &self.config.logfile,
            project_id,
        )
        .with_docker_config(self.config.docker_config.clone())
        .with_pyxis_env(self.config.pyxis_env.clone());

        tokio::select! {
            _ = cancel.cancelled() => return Err(CertError::Cancelled("submission".to_string())),
            submitted = submitter.submit(policy) => { submitted?; }
        }
        engine.mark_submitted()
    }
}
