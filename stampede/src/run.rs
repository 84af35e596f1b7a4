use std::path::PathBuf;

use anyhow::Context as _;
use stampede_core::report::RunReport;
use stampede_core::{Error as CoreError, HealthOutcome, HttpClient};

use crate::cli::{OutputFormat, RunArgs};
use crate::exit_codes::ExitCode;
use crate::output;
use crate::plan_yaml;
use crate::run_error::RunError;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let mut plan = plan_yaml::load_plan(&args.plan, args.scenario.as_deref())
        .map_err(RunError::InvalidInput)?;

    // CLI flags win over the plan file.
    if let Some(base_url) = args.base_url {
        plan.base_url = base_url;
    }
    if let Some(target) = args.target {
        plan.target = Some(target);
    }
    if let Some(seed) = args.seed {
        plan.seed = Some(seed);
    }
    if args.strict_status {
        plan.strict_status = true;
    }
    if let Some(timeout) = args.extended_timeout {
        plan.extended_timeout = Some(timeout);
    }
    if args.no_health_check {
        plan.health = None;
    }
    if args.no_auth_check {
        plan.auth_check = None;
    }

    let base_url = plan.base_url.clone();
    let seed = plan.seed;

    let summary = stampede_core::run::run(plan, HttpClient::default())
        .await
        .map_err(map_core_error)?;

    if let HealthOutcome::Warning(msg) = &summary.health {
        eprintln!("warning: {msg}");
    }

    let report = RunReport::build(&summary, &base_url, seed);

    match args.output {
        OutputFormat::HumanReadable => {
            print!("{}", output::human::render(&summary, &report));
        }
        OutputFormat::Json => {
            let json = output::json::render(&report).map_err(RunError::RuntimeError)?;
            println!("{json}");
        }
    }

    if let Some(path) = args.report_out {
        let path = resolve_report_path(path, &report);
        let json = output::json::render(&report).map_err(RunError::RuntimeError)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("failed to write report to {}", path.display()))
            .map_err(RunError::RuntimeError)?;
        eprintln!("report written to {}", path.display());
    }

    Ok(ExitCode::from_run(!report.recommendations.is_empty()))
}

fn resolve_report_path(path: PathBuf, report: &RunReport) -> PathBuf {
    if path.is_dir() {
        path.join(report.suggested_filename())
    } else {
        path
    }
}

fn map_core_error(err: CoreError) -> RunError {
    match &err {
        CoreError::AuthCheckFailed { .. } => RunError::AuthFailed(err.into()),
        e if e.is_pre_run() => RunError::InvalidInput(err.into()),
        _ => RunError::RuntimeError(err.into()),
    }
}
