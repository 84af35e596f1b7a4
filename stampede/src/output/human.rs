use std::fmt::Write as _;
use std::time::Duration;

use stampede_core::HealthOutcome;
use stampede_core::report::RunReport;
use stampede_core::run::RunSummary;

pub(crate) fn render(summary: &RunSummary, report: &RunReport) -> String {
    let mut out = String::new();

    writeln!(
        &mut out,
        "run: {} ({})",
        report.test_info.scenario,
        humantime::format_duration(Duration::from_millis(report.test_info.duration_ms))
    )
    .ok();

    match &summary.health {
        HealthOutcome::Skipped => {}
        HealthOutcome::Passed { status } => {
            writeln!(&mut out, "health check: ok (status {status})").ok();
        }
        HealthOutcome::Warning(msg) => {
            writeln!(&mut out, "health check warning: {msg}").ok();
        }
    }

    writeln!(
        &mut out,
        "sessions: {} (requests {}, skipped {})",
        summary.sessions, summary.executed, summary.skipped
    )
    .ok();
    for trip in &summary.trips {
        writeln!(
            &mut out,
            "circuit breaker opened: error rate {:.1}% over {} samples ({} errors)",
            trip.error_rate * 100.0,
            trip.samples,
            trip.errors
        )
        .ok();
    }
    out.push('\n');

    render_endpoint_table(report, &mut out);
    render_totals(report, &mut out);
    render_failure_analysis(report, &mut out);

    if !report.recommendations.is_empty() {
        out.push_str("recommendations\n");
        for r in &report.recommendations {
            writeln!(&mut out, "  - {r}").ok();
        }
    }

    out
}

fn render_endpoint_table(report: &RunReport, out: &mut String) {
    if report.endpoints.is_empty() {
        out.push_str("no requests were recorded\n\n");
        return;
    }

    let name_width = report
        .endpoints
        .iter()
        .map(|e| e.name.len())
        .max()
        .unwrap_or(0)
        .max("endpoint".len());

    writeln!(
        out,
        "{:<name_width$}  {:>8}  {:>8}  {:>7}  {:>8}  {:>8}  {:>8}  {:>8}  {:>8}",
        "endpoint", "requests", "success", "errors", "timeouts", "avg", "p95", "max", "rate"
    )
    .ok();

    for e in &report.endpoints {
        writeln!(
            out,
            "{:<name_width$}  {:>8}  {:>8}  {:>7}  {:>8}  {:>6.0}ms  {:>6}ms  {:>6}ms  {:>7.1}%",
            e.name,
            e.requests,
            e.success,
            e.errors,
            e.timeouts,
            e.avg_ms,
            e.p95_ms,
            e.max_ms,
            e.success_rate_pct
        )
        .ok();
    }
    out.push('\n');
}

fn render_totals(report: &RunReport, out: &mut String) {
    let agg = &report.aggregate;
    out.push_str("totals\n");
    writeln!(
        out,
        "  requests: {} (success {}, errors {}, timeouts {}, skipped {})",
        agg.requests, agg.success, agg.errors, agg.timeouts, agg.skipped
    )
    .ok();
    writeln!(
        out,
        "  latency: avg={:.0}ms min={}ms max={}ms",
        agg.avg_ms, agg.min_ms, agg.max_ms
    )
    .ok();

    if !agg.status_codes.is_empty() {
        let codes = agg
            .status_codes
            .iter()
            .map(|(code, count)| format!("{code}={count}"))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(out, "  status codes: {codes}").ok();
    }
    writeln!(out, "  error rate: {:.1}%", agg.error_rate * 100.0).ok();
    out.push('\n');
}

fn render_failure_analysis(report: &RunReport, out: &mut String) {
    let analysis = &report.failure_analysis;
    if analysis.most_failed.is_none() && analysis.slowest.is_none() {
        return;
    }

    out.push_str("error analysis\n");
    if let Some(most) = &analysis.most_failed {
        writeln!(
            out,
            "  most failed: {} ({} errors, {:.1}% error rate, {})",
            most.endpoint,
            most.errors,
            most.error_rate * 100.0,
            most.class
        )
        .ok();
        writeln!(out, "    -> {}", most.recommendation).ok();
    }
    if let Some(slow) = &analysis.slowest {
        writeln!(out, "  slowest: {} (p95 {}ms)", slow.endpoint, slow.p95_ms).ok();
        writeln!(out, "    -> {}", slow.recommendation).ok();
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::EndpointSnapshot;
    use std::collections::BTreeMap;

    fn summary_with(endpoints: Vec<EndpointSnapshot>) -> RunSummary {
        RunSummary {
            scenario: "smoke".to_string(),
            health: HealthOutcome::Warning("health check returned status 503".to_string()),
            elapsed: Duration::from_secs(30),
            sessions: 10,
            executed: 40,
            skipped: 0,
            trips: Vec::new(),
            endpoints,
        }
    }

    fn snapshot(name: &str) -> EndpointSnapshot {
        EndpointSnapshot {
            name: name.to_string(),
            requests: 0,
            success: 0,
            errors: 0,
            timeouts: 0,
            skipped: 0,
            duration_ms_total: 0,
            min_ms: None,
            max_ms: None,
            status_codes: BTreeMap::new(),
            samples_ms: Vec::new(),
            error_records: Vec::new(),
        }
    }

    #[test]
    fn render_includes_table_totals_and_health_warning() {
        let mut s = snapshot("list_orders");
        s.requests = 40;
        s.success = 36;
        s.errors = 4;
        s.duration_ms_total = 4000;
        s.min_ms = Some(20);
        s.max_ms = Some(900);
        s.samples_ms = vec![100; 40];
        s.status_codes.insert(200, 36);
        s.status_codes.insert(500, 4);

        let summary = summary_with(vec![s]);
        let report = RunReport::build(&summary, "http://localhost:8080", None);
        let text = render(&summary, &report);

        assert!(text.contains("run: smoke"));
        assert!(text.contains("health check warning"));
        assert!(text.contains("endpoint"));
        assert!(text.contains("list_orders"));
        assert!(text.contains("totals"));
        assert!(text.contains("status codes: 200=36 500=4"));
        assert!(text.contains("error rate: 10.0%"));
        assert!(text.contains("error analysis"));
        assert!(text.contains("recommendations"));
    }

    #[test]
    fn render_without_traffic_says_so() {
        let summary = summary_with(Vec::new());
        let report = RunReport::build(&summary, "http://localhost:8080", None);
        let text = render(&summary, &report);
        assert!(text.contains("no requests were recorded"));
        assert!(!text.contains("error analysis"));
    }
}
