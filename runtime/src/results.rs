//! Run result reporting: the JSON report, the text summary and the
//! tag/digest binding notice.

use ccert_core::{CheckOutcome, RunResult};
use serde::{Deserialize, Serialize};

use crate::oci::ImageReference;

/// Name reported as the test library in `results.json`.
pub const TEST_LIBRARY_NAME: &str = "ccert";

/// How the tested tag will be bound to the image digest after publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingInfo {
    pub message: String,
    /// Digest references carry no tag; the user should be warned.
    pub warn: bool,
}

pub fn tag_digest_binding_info(reference: &ImageReference, digest: &str) -> BindingInfo {
    if reference.is_digest() {
        return BindingInfo {
            message: "You've provided an image by digest. When submitting this image to Red Hat for certification, no tag will be associated with this image. If you would like to associate a tag with this image, please rerun this tool replacing your image reference with a tag.".to_string(),
            warn: true,
        };
    }
    BindingInfo {
        message: format!(
            "This image's tag {} will be paired with digest {} once this image has been published in accordance with Red Hat Certification policy. You may then add or remove any supplemental tags through your Red Hat Connect portal as you see fit.",
            reference.identifier(),
            digest
        ),
        warn: false,
    }
}

/// `results.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsReport {
    pub image: String,
    pub passed: bool,
    pub test_library: TestLibrary,
    pub results: ReportResults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestLibrary {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportResults {
    pub passed: Vec<ReportEntry>,
    pub failed: Vec<ReportEntry>,
    pub errors: Vec<ReportEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub name: String,
    /// Milliseconds
    pub elapsed_time: u64,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledgebase_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_url: Option<String>,
}

impl ReportEntry {
    fn passed(outcome: &CheckOutcome) -> Self {
        Self {
            name: outcome.name().to_string(),
            elapsed_time: elapsed_ms(outcome),
            description: outcome.check.metadata.description.clone(),
            help: None,
            suggestion: None,
            knowledgebase_url: None,
            check_url: None,
        }
    }

    fn with_help(outcome: &CheckOutcome) -> Self {
        let check = &outcome.check;
        Self {
            help: Some(check.help.message.clone()),
            suggestion: Some(check.help.suggestion.clone()),
            knowledgebase_url: Some(check.metadata.knowledge_base_url.clone()),
            check_url: Some(check.metadata.check_url.clone()),
            ..Self::passed(outcome)
        }
    }
}

fn elapsed_ms(outcome: &CheckOutcome) -> u64 {
    u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX)
}

impl ResultsReport {
    pub fn new(result: &RunResult) -> Self {
        Self {
            image: result.tested_image.clone(),
            passed: result.passed_overall,
            test_library: TestLibrary {
                name: TEST_LIBRARY_NAME.to_string(),
                version: ccert_core::VERSION.to_string(),
            },
            results: ReportResults {
                passed: result.passed.iter().map(ReportEntry::passed).collect(),
                failed: result.failed.iter().map(ReportEntry::with_help).collect(),
                errors: result.errors.iter().map(ReportEntry::with_help).collect(),
            },
        }
    }
}

/// One line per check: passed, then failed, then errored.
pub fn format_text(result: &RunResult) -> String {
    let mut out = String::new();
    let groups = [
        ("PASSED ", &result.passed),
        ("FAILED ", &result.failed),
        ("ERRORED", &result.errors),
    ];
    for (label, outcomes) in groups {
        for outcome in outcomes {
            out.push_str(&format!("{} {} in {}ms\n", label, outcome.name(), elapsed_ms(outcome)));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccert_core::{CheckInfo, CheckMetadata, HelpText, Level, OutcomeKind};
    use std::time::Duration;

    fn outcome(name: &str, kind: OutcomeKind, ms: u64) -> CheckOutcome {
        CheckOutcome {
            check: CheckInfo {
                name: name.to_string(),
                metadata: CheckMetadata {
                    description: format!("{name} description"),
                    level: Level::Best,
                    knowledge_base_url: "https://kb".into(),
                    check_url: "https://check".into(),
                },
                help: HelpText {
                    message: format!("{name} help"),
                    suggestion: format!("{name} suggestion"),
                },
            },
            kind,
            elapsed: Duration::from_millis(ms),
        }
    }

    fn sample() -> RunResult {
        let mut result = RunResult::new("quay.io/acme/app:v1");
        result.record(outcome("HasLicense", OutcomeKind::Passed, 3));
        result.record(outcome("LayerCountAcceptable", OutcomeKind::Failed, 1));
        result.record(outcome("BasedOnUbi", OutcomeKind::Errored, 250));
        result.finalize();
        result
    }

    #[test]
    fn test_digest_reference_warns() {
        let reference = ImageReference::parse(
            "quay.io/acme/app@sha256:0000000000000000000000000000000000000000000000000000000000000000",
        )
        .unwrap();
        let info = tag_digest_binding_info(&reference, "sha256:abc");
        assert!(info.warn);
        assert!(info.message.contains("no tag will be associated"));
    }

    #[test]
    fn test_tag_reference_names_tag_and_digest() {
        let reference = ImageReference::parse("quay.io/acme/app:v1.2").unwrap();
        let info = tag_digest_binding_info(&reference, "sha256:abc");
        assert!(!info.warn);
        assert!(info.message.starts_with("This image's tag v1.2 will be paired with digest sha256:abc"));
    }

    #[test]
    fn test_report_shape() {
        let report = ResultsReport::new(&sample());
        assert!(!report.passed);
        assert_eq!(report.image, "quay.io/acme/app:v1");
        assert_eq!(report.test_library.name, TEST_LIBRARY_NAME);

        let json = serde_json::to_value(&report).unwrap();
        let passed = &json["results"]["passed"][0];
        assert_eq!(passed["name"], "HasLicense");
        assert_eq!(passed["elapsed_time"], 3);
        assert!(passed.get("help").is_none());

        let failed = &json["results"]["failed"][0];
        assert_eq!(failed["suggestion"], "LayerCountAcceptable suggestion");
        assert_eq!(failed["knowledgebase_url"], "https://kb");
        assert_eq!(json["results"]["errors"][0]["help"], "BasedOnUbi help");
    }

    #[test]
    fn test_format_text() {
        assert_eq!(
            format_text(&sample()),
            "PASSED  HasLicense in 3ms\nFAILED  LayerCountAcceptable in 1ms\nERRORED BasedOnUbi in 250ms\n"
        );
    }
}
