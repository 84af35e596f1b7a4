use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    humantime::parse_duration(input.trim()).map_err(|err| format!("invalid duration: {err}"))
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    HumanReadable,
    /// Print the structured report as JSON to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "stampede",
    author,
    version,
    about = "Configuration-driven HTTP load-generation harness",
    long_about = "stampede drives a population of simulated virtual users against a target API.\n\nA YAML plan defines endpoints, user profiles, ramp scenarios, retry and circuit-breaker policy. The run produces a per-endpoint summary and a structured JSON report.",
    after_help = "Examples:\n  stampede run plan.yaml\n  stampede run plan.yaml --scenario soak --seed 42\n  stampede run plan.yaml --target list_orders --output json\n  stampede run plan.yaml --base-url http://staging.internal:8080 --report-out reports/"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load plan
    #[command(
        long_about = "Load a plan file, verify the target, and drive the selected scenario to completion.\n\nCLI flags override values from the plan file."
    )]
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the plan file (.yaml)
    pub plan: PathBuf,

    /// Override the plan's base URL
    #[arg(long, env = "STAMPEDE_BASE_URL")]
    pub base_url: Option<String>,

    /// Scenario to run (otherwise the plan's default, or its first scenario)
    #[arg(long)]
    pub scenario: Option<String>,

    /// Drive traffic at this one endpoint only, bypassing weighted selection
    #[arg(long)]
    pub target: Option<String>,

    /// Seed the per-VU random sources for reproducible selection
    #[arg(long)]
    pub seed: Option<u64>,

    /// Require exact expected-status matches instead of accepting any 2xx for an expected 2xx
    #[arg(long)]
    pub strict_status: bool,

    /// Per-request timeout override for long-running diagnostics (e.g. 120s)
    #[arg(long, value_parser = parse_duration)]
    pub extended_timeout: Option<Duration>,

    /// Skip the pre-run health check
    #[arg(long)]
    pub no_health_check: bool,

    /// Skip the pre-run authentication check
    #[arg(long)]
    pub no_auth_check: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Write the JSON report here (a directory gets a timestamped filename)
    #[arg(long, value_name = "PATH")]
    pub report_out: Option<PathBuf>,
}
