//! Table formatting helpers for CLI output.

use comfy_table::{ContentArrangement, Table};

/// Create a styled table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

/// Output format of a run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
}

/// Render a run result in the requested format.
pub fn render(result: &ccert_core::RunResult, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(ccert_runtime::format_text(result)),
        ReportFormat::Json => {
            serde_json::to_string_pretty(&ccert_runtime::ResultsReport::new(result))
        }
    }
}

/// One-word verdict for the summary line.
pub fn verdict(result: &ccert_core::RunResult) -> &'static str {
    if result.passed_overall {
        "PASSED"
    } else {
        "FAILED"
    }
}
