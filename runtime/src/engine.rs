//! Certification run driver.
//!
//! One [`CertificationEngine::execute`] call walks the run forward:
//!
//! ```text
//! Initialized → Pulling → Extracting → PolicyResolved → ChecksRunning → Aggregated → (Submitted)
//! ```
//!
//! The extracted filesystem lives only as long as the run; it is removed
//! before `execute` returns, whether the run succeeded or not.

use std::time::Instant;

use ccert_core::error::{CertError, Result};
use ccert_core::{CheckOutcome, Level, OutcomeKind, Policy, RunResult};
use tokio_util::sync::CancellationToken;

use crate::artifacts::{ArtifactWriter, RESULTS_FILENAME};
use crate::checklist::build_checklist;
use crate::checks::{Check, CheckDeps, CheckId};
use crate::materialize::{MaterializedImage, Materializer};
use crate::policy_resolver::resolve_policy;
use crate::results::{tag_digest_binding_info, BindingInfo, ResultsReport};

/// Stage of a certification run. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunState {
    Initialized,
    Pulling,
    Extracting,
    PolicyResolved,
    ChecksRunning,
    Aggregated,
    Submitted,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initialized => "initialized",
            Self::Pulling => "pulling",
            Self::Extracting => "extracting",
            Self::PolicyResolved => "policy-resolved",
            Self::ChecksRunning => "checks-running",
            Self::Aggregated => "aggregated",
            Self::Submitted => "submitted",
        };
        f.write_str(s)
    }
}

/// Where the run's policy comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicySource {
    /// Always use this policy.
    Fixed(Policy),
    /// Look the policy up from the certification project when credentials exist.
    Project { has_credentials: bool },
}

/// Drives one certification run.
pub struct CertificationEngine {
    materializer: Materializer,
    deps: CheckDeps,
    artifacts: ArtifactWriter,
    policy_source: PolicySource,
    /// Replaces the policy's checklist when set.
    checks: Option<Vec<CheckId>>,
    state: RunState,
    policy: Option<Policy>,
    result: Option<RunResult>,
    binding: Option<BindingInfo>,
}

impl CertificationEngine {
    pub fn new(deps: CheckDeps, artifacts: ArtifactWriter, policy_source: PolicySource) -> Self {
        let materializer = Materializer::new(deps.fetcher.clone(), deps.scanner.clone(), artifacts.clone());
        Self {
            materializer,
            deps,
            artifacts,
            policy_source,
            checks: None,
            state: RunState::Initialized,
            policy: None,
            result: None,
            binding: None,
        }
    }

    /// Run exactly these checks instead of the policy's checklist.
    pub fn with_checks(mut self, checks: Vec<CheckId>) -> Self {
        self.checks = Some(checks);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Policy the run resolved, once past [`RunState::PolicyResolved`].
    pub fn policy(&self) -> Option<Policy> {
        self.policy
    }

    pub fn result(&self) -> Option<&RunResult> {
        self.result.as_ref()
    }

    pub fn binding(&self) -> Option<&BindingInfo> {
        self.binding.as_ref()
    }

    pub fn artifacts(&self) -> &ArtifactWriter {
        &self.artifacts
    }

    fn advance(&mut self, next: RunState) -> Result<()> {
        if next <= self.state {
            return Err(CertError::Other(format!(
                "Run cannot move from {} to {}",
                self.state, next
            )));
        }
        tracing::debug!(from = %self.state, to = %next, "Run state change");
        self.state = next;
        Ok(())
    }

    /// Record that the results were submitted.
    pub fn mark_submitted(&mut self) -> Result<()> {
        if self.state != RunState::Aggregated {
            return Err(CertError::SubmissionError(format!(
                "results are not ready for submission (run is {})",
                self.state
            )));
        }
        self.advance(RunState::Submitted)
    }

    /// Pull, extract and check `image_uri`, then write `results.json`.
    pub async fn execute(&mut self, image_uri: &str, cancel: &CancellationToken) -> Result<&RunResult> {
        self.advance(RunState::Pulling)?;
        tracing::info!(image = image_uri, "Pulling image");
        let pulled = self.materializer.pull(image_uri, cancel).await?;

        self.advance(RunState::Extracting)?;
        let mut image = self.materializer.extract(pulled, cancel).await?;

        let policy = match self.policy_source {
            PolicySource::Fixed(policy) => policy,
            PolicySource::Project { has_credentials } => {
                resolve_policy(self.deps.authority.as_ref(), has_credentials).await?
            }
        };
        self.policy = Some(policy);
        self.advance(RunState::PolicyResolved)?;
        tracing::info!(%policy, "Certification policy");

        self.materializer.inventory(&mut image, policy).await;

        let checks: Vec<Box<dyn Check>> = match &self.checks {
            Some(ids) => ids.iter().map(|id| id.build(&self.deps)).collect(),
            None => build_checklist(policy, &self.deps),
        };

        self.advance(RunState::ChecksRunning)?;
        let result = run_checks(&checks, &image, cancel).await?;

        let binding = tag_digest_binding_info(image.reference(), image.image().digest());
        // Removes the extracted filesystem.
        drop(image);

        self.artifacts
            .write_json(RESULTS_FILENAME, &ResultsReport::new(&result))?;
        if binding.warn {
            tracing::warn!("{}", binding.message);
        } else {
            tracing::info!("{}", binding.message);
        }

        self.binding = Some(binding);
        self.advance(RunState::Aggregated)?;
        Ok(self.result.insert(result))
    }
}

/// Run `checks` in order against `image`.
///
/// A check error becomes an errored outcome; only cancellation stops the run.
pub async fn run_checks(
    checks: &[Box<dyn Check>],
    image: &MaterializedImage,
    cancel: &CancellationToken,
) -> Result<RunResult> {
    let mut result = RunResult::new(image.image_uri());

    for check in checks {
        if cancel.is_cancelled() {
            return Err(CertError::Cancelled(format!("before check {}", check.name())));
        }
        let info = check.info();
        let level = info.metadata.level;
        if level == Level::Optional {
            tracing::info!("Check {} is not currently being enforced.", check.name());
        }

        tracing::debug!(check = check.name(), "Running check");
        let start = Instant::now();
        let outcome = check.validate(image, cancel).await;
        let elapsed = start.elapsed();
        let kind = OutcomeKind::classify(&outcome);

        match &outcome {
            Err(e) => tracing::error!(check = check.name(), %level, error = %e, "{}", kind),
            Ok(_) => tracing::info!(check = check.name(), %level, elapsed_ms = elapsed.as_millis() as u64, "{}", kind),
        }

        result.record(CheckOutcome {
            check: info,
            kind,
            elapsed,
        });
    }

    result.finalize();
    Ok(result)
}
