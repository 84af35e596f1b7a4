use anyhow::Context as _;
use stampede_core::report::RunReport;

pub(crate) fn render(report: &RunReport) -> anyhow::Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize report")
}
