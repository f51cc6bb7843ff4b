//! Check metadata, outcomes and run results.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Importance level of a check.
///
/// Levels only change how loudly a result is logged, except [`Level::Optional`]:
/// optional checks still run but never contribute to a [`RunResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Best,
    Better,
    Good,
    Optional,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Best => "best",
            Self::Better => "better",
            Self::Good => "good",
            Self::Optional => "optional",
        };
        f.write_str(s)
    }
}

/// Descriptive metadata for a check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckMetadata {
    pub description: String,
    pub level: Level,
    pub knowledge_base_url: String,
    pub check_url: String,
}

/// Remediation text shown when a check fails or errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelpText {
    pub message: String,
    pub suggestion: String,
}

/// Identity of an executed check, detached from the check instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInfo {
    pub name: String,
    pub metadata: CheckMetadata,
    pub help: HelpText,
}

/// How a check finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    /// The image satisfied the check.
    Passed,
    /// The check ran but the image did not satisfy it.
    Failed,
    /// The check itself could not complete.
    Errored,
}

impl OutcomeKind {
    /// Classify a predicate result.
    pub fn classify<E>(result: &std::result::Result<bool, E>) -> Self {
        match result {
            Ok(true) => Self::Passed,
            Ok(false) => Self::Failed,
            Err(_) => Self::Errored,
        }
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Errored => "ERROR",
        };
        f.write_str(s)
    }
}

/// The outcome of one check execution.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub check: CheckInfo,
    pub kind: OutcomeKind,
    pub elapsed: Duration,
}

impl CheckOutcome {
    pub fn name(&self) -> &str {
        &self.check.name
    }
}

/// Aggregated results of a certification run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunResult {
    /// The image reference as provided by the user.
    pub tested_image: String,
    pub passed: Vec<CheckOutcome>,
    pub failed: Vec<CheckOutcome>,
    pub errors: Vec<CheckOutcome>,
    /// True iff `failed` and `errors` are both empty.
    pub passed_overall: bool,
}

impl RunResult {
    pub fn new(tested_image: impl Into<String>) -> Self {
        Self {
            tested_image: tested_image.into(),
            ..Default::default()
        }
    }

    /// Record an outcome in the collection matching its kind.
    ///
    /// Outcomes of optional checks are dropped here and nowhere else.
    /// Returns whether the outcome was kept.
    pub fn record(&mut self, outcome: CheckOutcome) -> bool {
        if outcome.check.metadata.level == Level::Optional {
            return false;
        }
        match outcome.kind {
            OutcomeKind::Passed => self.passed.push(outcome),
            OutcomeKind::Failed => self.failed.push(outcome),
            OutcomeKind::Errored => self.errors.push(outcome),
        }
        true
    }

    /// Compute the overall verdict from the collected outcomes.
    pub fn finalize(&mut self) {
        self.passed_overall = self.errors.is_empty() && self.failed.is_empty();
    }

    /// Total number of recorded outcomes.
    pub fn len(&self) -> usize {
        self.passed.len() + self.failed.len() + self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
