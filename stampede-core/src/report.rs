use serde::Serialize;
use std::collections::BTreeMap;
use std::time::SystemTime;

use stampede_metrics::EndpointSnapshot;

use crate::run::RunSummary;

/// p95 above this gets a per-endpoint optimization recommendation.
const SLOW_P95_ALERT_MS: u64 = 10_000;
/// p95 above this flags overall performance degradation.
const DEGRADED_P95_MS: u64 = 15_000;
/// Overall error-rate fraction above which degradation is flagged.
const DEGRADED_ERROR_RATE: f64 = 0.05;
/// Raw error records carried into the structured report.
const ERROR_SAMPLE_CAP: usize = 100;

/// Value at the given percentile rank of a sorted sample list.
///
/// Rank is `floor(len * percentile)`, clamped to the last element; an empty
/// list yields 0.
#[must_use]
pub fn percentile(sorted: &[u64], percentile: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((sorted.len() as f64) * percentile).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointReport {
    pub name: String,
    pub requests: u64,
    pub success: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub skipped: u64,
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    /// Success rate as a percentage (0..=100).
    pub success_rate_pct: f64,
    pub error_rate: f64,
    pub status_codes: BTreeMap<u16, u64>,
}

impl EndpointReport {
    pub fn from_snapshot(snap: &EndpointSnapshot) -> Self {
        let mut sorted = snap.samples_ms.clone();
        sorted.sort_unstable();

        let success_rate_pct = if snap.requests == 0 {
            0.0
        } else {
            (snap.success as f64) / (snap.requests as f64) * 100.0
        };
        let error_rate = if snap.requests == 0 {
            0.0
        } else {
            (snap.errors as f64) / (snap.requests as f64)
        };

        Self {
            name: snap.name.clone(),
            requests: snap.requests,
            success: snap.success,
            errors: snap.errors,
            timeouts: snap.timeouts,
            skipped: snap.skipped,
            avg_ms: snap.avg_ms(),
            min_ms: snap.min_ms.unwrap_or(0),
            max_ms: snap.max_ms.unwrap_or(0),
            p95_ms: percentile(&sorted, 0.95),
            p99_ms: percentile(&sorted, 0.99),
            success_rate_pct,
            error_rate,
            status_codes: snap.status_codes.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReport {
    pub requests: u64,
    pub success: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub skipped: u64,
    /// Request-count-weighted average duration.
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub error_rate: f64,
    pub status_codes: BTreeMap<u16, u64>,
}

impl AggregateReport {
    pub fn from_snapshots(snaps: &[EndpointSnapshot]) -> Self {
        let requests: u64 = snaps.iter().map(|s| s.requests).sum();
        let duration_total: u64 = snaps.iter().map(|s| s.duration_ms_total).sum();

        let mut status_codes: BTreeMap<u16, u64> = BTreeMap::new();
        for s in snaps {
            for (code, count) in &s.status_codes {
                *status_codes.entry(*code).or_insert(0) += count;
            }
        }

        let errors: u64 = snaps.iter().map(|s| s.errors).sum();
        Self {
            requests,
            success: snaps.iter().map(|s| s.success).sum(),
            errors,
            timeouts: snaps.iter().map(|s| s.timeouts).sum(),
            skipped: snaps.iter().map(|s| s.skipped).sum(),
            avg_ms: if requests == 0 {
                0.0
            } else {
                (duration_total as f64) / (requests as f64)
            },
            min_ms: snaps.iter().filter_map(|s| s.min_ms).min().unwrap_or(0),
            max_ms: snaps.iter().filter_map(|s| s.max_ms).max().unwrap_or(0),
            error_rate: if requests == 0 {
                0.0
            } else {
                (errors as f64) / (requests as f64)
            },
            status_codes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
pub enum FailureClass {
    #[strum(serialize = "timeout-dominant")]
    TimeoutDominant,
    #[strum(serialize = "server-error-dominant")]
    ServerErrorDominant,
    #[strum(serialize = "client-error-dominant")]
    ClientErrorDominant,
}

impl FailureClass {
    pub fn recommendation(self) -> &'static str {
        match self {
            FailureClass::TimeoutDominant => {
                "Raise the endpoint timeout or investigate slow upstream dependencies"
            }
            FailureClass::ServerErrorDominant => {
                "Inspect server logs for the 5xx causes; the backend is failing under load"
            }
            FailureClass::ClientErrorDominant => {
                "Check request payloads, auth headers, and endpoint configuration"
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MostFailed {
    pub endpoint: String,
    pub errors: u64,
    pub error_rate: f64,
    pub class: FailureClass,
    pub recommendation: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowEndpoint {
    pub endpoint: String,
    pub p95_ms: u64,
    pub recommendation: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureAnalysis {
    pub most_failed: Option<MostFailed>,
    pub slowest: Option<SlowEndpoint>,
}

impl FailureAnalysis {
    pub fn from_reports(snaps: &[EndpointSnapshot], reports: &[EndpointReport]) -> Self {
        let most_failed = snaps
            .iter()
            .filter(|s| s.errors > 0)
            .max_by_key(|s| s.errors)
            .map(|s| {
                let class = classify_failures(s);
                MostFailed {
                    endpoint: s.name.clone(),
                    errors: s.errors,
                    error_rate: if s.requests == 0 {
                        0.0
                    } else {
                        (s.errors as f64) / (s.requests as f64)
                    },
                    class,
                    recommendation: class.recommendation().to_string(),
                }
            });

        let slowest = reports
            .iter()
            .filter(|r| r.p95_ms > SLOW_P95_ALERT_MS)
            .max_by_key(|r| r.p95_ms)
            .map(|r| SlowEndpoint {
                endpoint: r.name.clone(),
                p95_ms: r.p95_ms,
                recommendation: format!(
                    "p95 latency of {}ms on `{}` exceeds {}ms; profile and optimize this handler",
                    r.p95_ms, r.name, SLOW_P95_ALERT_MS
                ),
            });

        Self {
            most_failed,
            slowest,
        }
    }
}

fn classify_failures(snap: &EndpointSnapshot) -> FailureClass {
    if snap.errors > 0 && snap.timeouts * 2 >= snap.errors {
        return FailureClass::TimeoutDominant;
    }
    let any_5xx = snap
        .status_codes
        .iter()
        .any(|(code, count)| (500..600).contains(code) && *count > 0);
    if any_5xx {
        FailureClass::ServerErrorDominant
    } else {
        FailureClass::ClientErrorDominant
    }
}

/// Advisory degradation signals, never abort conditions.
pub fn degradation_advice(aggregate: &AggregateReport, reports: &[EndpointReport]) -> Vec<String> {
    let mut advice = Vec::new();
    if aggregate.error_rate > DEGRADED_ERROR_RATE {
        advice.push(format!(
            "Overall error rate is {:.1}%; review server logs and run configuration",
            aggregate.error_rate * 100.0
        ));
    }
    if let Some(r) = reports.iter().find(|r| r.p95_ms > DEGRADED_P95_MS) {
        advice.push(format!(
            "Endpoint `{}` has p95 {}ms (above {}ms); the backend needs optimization",
            r.name, r.p95_ms, DEGRADED_P95_MS
        ));
    }
    advice
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestInfo {
    pub scenario: String,
    pub base_url: String,
    pub completed_at: String,
    pub duration_ms: u64,
    pub sessions: u64,
    pub executed: u64,
    pub skipped: u64,
    pub breaker_trips: u64,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSample {
    pub endpoint: String,
    pub kind: String,
    pub message: String,
    pub at: String,
}

/// The structured end-of-run document, ready for JSON persistence.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub test_info: TestInfo,
    pub aggregate: AggregateReport,
    pub endpoints: Vec<EndpointReport>,
    pub failure_analysis: FailureAnalysis,
    pub recommendations: Vec<String>,
    pub error_samples: Vec<ErrorSample>,
}

impl RunReport {
    pub fn build(summary: &RunSummary, base_url: &str, seed: Option<u64>) -> Self {
        let reports: Vec<EndpointReport> = summary
            .endpoints
            .iter()
            .map(EndpointReport::from_snapshot)
            .collect();
        let aggregate = AggregateReport::from_snapshots(&summary.endpoints);
        let failure_analysis = FailureAnalysis::from_reports(&summary.endpoints, &reports);
        let recommendations = degradation_advice(&aggregate, &reports);

        let mut error_samples = Vec::new();
        'outer: for snap in &summary.endpoints {
            for record in &snap.error_records {
                if error_samples.len() >= ERROR_SAMPLE_CAP {
                    break 'outer;
                }
                error_samples.push(ErrorSample {
                    endpoint: snap.name.clone(),
                    kind: record.kind.clone(),
                    message: record.message.clone(),
                    at: record.at.clone(),
                });
            }
        }

        Self {
            test_info: TestInfo {
                scenario: summary.scenario.clone(),
                base_url: base_url.to_string(),
                completed_at: humantime::format_rfc3339_seconds(SystemTime::now()).to_string(),
                duration_ms: summary.elapsed.as_millis().min(u64::MAX as u128) as u64,
                sessions: summary.sessions,
                executed: summary.executed,
                skipped: summary.skipped,
                breaker_trips: summary.trips.len() as u64,
                seed,
            },
            aggregate,
            endpoints: reports,
            failure_analysis,
            recommendations,
            error_samples,
        }
    }

    /// Filename for persisting this report, timestamp flattened for
    /// filesystem friendliness.
    #[must_use]
    pub fn suggested_filename(&self) -> String {
        let stamp: String = self
            .test_info
            .completed_at
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        format!("stampede-report-{stamp}.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::HealthOutcome;
    use stampede_metrics::ErrorRecord;
    use std::time::Duration;

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
    fn percentile_uses_floor_rank_on_the_sorted_list() {
        let sorted: Vec<u64> = (1..=100).collect();
        // floor(100 * 0.95) = 95 => 0-based index 95 => value 96.
        assert_eq!(percentile(&sorted, 0.95), 96);
        assert_eq!(percentile(&sorted, 0.99), 100);

        let small = vec![10, 20, 30];
        // floor(3 * 0.95) = 2 => 30.
        assert_eq!(percentile(&small, 0.95), 30);
        assert_eq!(percentile(&[], 0.95), 0);
    }

    #[test]
    fn endpoint_report_derives_rates_and_percentiles() {
        let mut s = snapshot("orders");
        s.requests = 4;
        s.success = 3;
        s.errors = 1;
        s.duration_ms_total = 400;
        s.min_ms = Some(50);
        s.max_ms = Some(200);
        s.samples_ms = vec![200, 50, 100, 50];

        let r = EndpointReport::from_snapshot(&s);
        assert_eq!(r.avg_ms, 100.0);
        assert_eq!(r.success_rate_pct, 75.0);
        assert_eq!(r.error_rate, 0.25);
        // sorted: [50, 50, 100, 200]; floor(4*0.95)=3 => 200.
        assert_eq!(r.p95_ms, 200);
    }

    #[test]
    fn aggregate_merges_histograms_and_weights_averages() {
        let mut a = snapshot("a");
        a.requests = 10;
        a.success = 10;
        a.duration_ms_total = 1000; // avg 100
        a.min_ms = Some(80);
        a.max_ms = Some(120);
        a.status_codes.insert(200, 10);

        let mut b = snapshot("b");
        b.requests = 30;
        b.success = 27;
        b.errors = 3;
        b.duration_ms_total = 6000; // avg 200
        b.min_ms = Some(40);
        b.max_ms = Some(900);
        b.status_codes.insert(200, 27);
        b.status_codes.insert(500, 3);

        let agg = AggregateReport::from_snapshots(&[a, b]);
        assert_eq!(agg.requests, 40);
        // Weighted: (100*10 + 200*30) / 40 = 175.
        assert_eq!(agg.avg_ms, 175.0);
        assert_eq!(agg.min_ms, 40);
        assert_eq!(agg.max_ms, 900);
        assert_eq!(agg.status_codes.get(&200), Some(&37));
        assert_eq!(agg.status_codes.get(&500), Some(&3));
        assert!((agg.error_rate - 0.075).abs() < 1e-9);
    }

    #[test]
    fn timeout_dominant_when_at_least_half_the_errors_are_timeouts() {
        let mut s = snapshot("slow");
        s.requests = 10;
        s.errors = 4;
        s.timeouts = 2;
        s.status_codes.insert(500, 2);
        assert_eq!(classify_failures(&s), FailureClass::TimeoutDominant);

        s.timeouts = 1;
        assert_eq!(classify_failures(&s), FailureClass::ServerErrorDominant);

        s.status_codes.clear();
        s.status_codes.insert(404, 3);
        assert_eq!(classify_failures(&s), FailureClass::ClientErrorDominant);
    }

    #[test]
    fn most_failed_endpoint_carries_class_and_recommendation() {
        let mut a = snapshot("a");
        a.requests = 10;
        a.errors = 1;
        a.status_codes.insert(500, 1);

        let mut b = snapshot("b");
        b.requests = 10;
        b.errors = 6;
        b.timeouts = 5;

        let reports: Vec<EndpointReport> = [&a, &b]
            .iter()
            .map(|s| EndpointReport::from_snapshot(s))
            .collect();
        let analysis = FailureAnalysis::from_reports(&[a, b], &reports);
        let most = match analysis.most_failed {
            Some(m) => m,
            None => panic!("expected a most-failed endpoint"),
        };
        assert_eq!(most.endpoint, "b");
        assert_eq!(most.class, FailureClass::TimeoutDominant);
        assert!((most.error_rate - 0.6).abs() < 1e-9);
        assert!(!most.recommendation.is_empty());
    }

    #[test]
    fn slow_endpoint_flagged_only_above_the_alert_threshold() {
        let mut s = snapshot("heavy");
        s.requests = 2;
        s.samples_ms = vec![12_000, 11_000];
        let reports = vec![EndpointReport::from_snapshot(&s)];
        let analysis = FailureAnalysis::from_reports(&[s], &reports);
        let slow = match analysis.slowest {
            Some(x) => x,
            None => panic!("expected a slow endpoint"),
        };
        assert_eq!(slow.endpoint, "heavy");
        assert_eq!(slow.p95_ms, 12_000);

        let mut fast = snapshot("fast");
        fast.requests = 2;
        fast.samples_ms = vec![100, 120];
        let reports = vec![EndpointReport::from_snapshot(&fast)];
        let analysis = FailureAnalysis::from_reports(&[fast], &reports);
        assert!(analysis.slowest.is_none());
    }

    #[test]
    fn degradation_flags_error_rate_and_high_p95() {
        let mut s = snapshot("x");
        s.requests = 100;
        s.success = 90;
        s.errors = 10;
        s.samples_ms = vec![16_000; 100];
        let reports = vec![EndpointReport::from_snapshot(&s)];
        let agg = AggregateReport::from_snapshots(&[s]);

        let advice = degradation_advice(&agg, &reports);
        assert_eq!(advice.len(), 2);

        let mut clean = snapshot("y");
        clean.requests = 100;
        clean.success = 100;
        clean.samples_ms = vec![100; 100];
        let reports = vec![EndpointReport::from_snapshot(&clean)];
        let agg = AggregateReport::from_snapshots(&[clean]);
        assert!(degradation_advice(&agg, &reports).is_empty());
    }

    #[test]
    fn report_caps_error_samples_and_suggests_a_filename() {
        let mut s = snapshot("orders");
        s.requests = 150;
        s.errors = 150;
        s.error_records = (0..150)
            .map(|i| ErrorRecord {
                kind: "HTTP_500".to_string(),
                message: format!("error {i}"),
                at: "2026-08-25T12:00:00Z".to_string(),
            })
            .collect();

        let summary = RunSummary {
            scenario: "soak".to_string(),
            health: HealthOutcome::Skipped,
            elapsed: Duration::from_secs(60),
            sessions: 10,
            executed: 150,
            skipped: 0,
            trips: Vec::new(),
            endpoints: vec![s],
        };

        let report = RunReport::build(&summary, "http://localhost:8080", Some(1));
        assert_eq!(report.error_samples.len(), 100);
        assert_eq!(report.test_info.scenario, "soak");
        assert_eq!(report.test_info.duration_ms, 60_000);

        let name = report.suggested_filename();
        assert!(name.starts_with("stampede-report-"));
        assert!(name.ends_with(".json"));
        assert!(!name.contains(':'));
    }
}
