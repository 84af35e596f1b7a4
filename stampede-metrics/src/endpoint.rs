use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::outcome::{RequestOutcome, Verdict};

/// One recorded failure, kept verbatim for the end-of-run error analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Classification string, e.g. `TIMEOUT` or `HTTP_503`.
    pub kind: String,
    pub message: String,
    /// RFC 3339 timestamp taken when the outcome was recorded.
    pub at: String,
}

/// Per-endpoint counters and accumulators.
///
/// Counter updates are atomic; the status-code histogram, raw duration samples
/// and error records sit behind mutexes. All fields grow monotonically during
/// a run and are only read back through [`EndpointMetrics::snapshot`].
#[derive(Debug)]
pub struct EndpointMetrics {
    requests_total: AtomicU64,
    success_total: AtomicU64,
    error_total: AtomicU64,
    timeout_total: AtomicU64,
    skipped_total: AtomicU64,
    duration_ms_total: AtomicU64,
    min_ms: AtomicU64,
    max_ms: AtomicU64,
    status_codes: Mutex<HashMap<u16, u64>>,
    samples_ms: Mutex<Vec<u64>>,
    errors: Mutex<Vec<ErrorRecord>>,
}

impl Default for EndpointMetrics {
    fn default() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            success_total: AtomicU64::new(0),
            error_total: AtomicU64::new(0),
            timeout_total: AtomicU64::new(0),
            skipped_total: AtomicU64::new(0),
            duration_ms_total: AtomicU64::new(0),
            // Sentinel: replaced by the first recorded sample.
            min_ms: AtomicU64::new(u64::MAX),
            max_ms: AtomicU64::new(0),
            status_codes: Mutex::new(HashMap::new()),
            samples_ms: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        }
    }
}

/// Point-in-time copy of one endpoint's metrics, safe to read after the run.
#[derive(Debug, Clone)]
pub struct EndpointSnapshot {
    pub name: String,
    pub requests: u64,
    pub success: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub skipped: u64,
    pub duration_ms_total: u64,
    pub min_ms: Option<u64>,
    pub max_ms: Option<u64>,
    pub status_codes: BTreeMap<u16, u64>,
    /// Raw duration samples in recording order (sorted by the report engine).
    pub samples_ms: Vec<u64>,
    pub error_records: Vec<ErrorRecord>,
}

impl EndpointSnapshot {
    #[must_use]
    pub fn avg_ms(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        (self.duration_ms_total as f64) / (self.requests as f64)
    }
}

impl EndpointMetrics {
    pub fn record(&self, outcome: &RequestOutcome) {
        let ms = outcome.duration.as_millis().min(u64::MAX as u128) as u64;

        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.duration_ms_total.fetch_add(ms, Ordering::Relaxed);
        update_min(&self.min_ms, ms);
        update_max(&self.max_ms, ms);

        {
            let mut codes = self.status_codes.lock();
            *codes.entry(outcome.status).or_insert(0) += 1;
        }
        self.samples_ms.lock().push(ms);

        match &outcome.verdict {
            Verdict::Success => {
                self.success_total.fetch_add(1, Ordering::Relaxed);
            }
            Verdict::Failed { kind, message } => {
                self.error_total.fetch_add(1, Ordering::Relaxed);
                if outcome.is_timeout() {
                    self.timeout_total.fetch_add(1, Ordering::Relaxed);
                }
                self.errors.lock().push(ErrorRecord {
                    kind: kind.to_string(),
                    message: message.clone(),
                    at: humantime::format_rfc3339_millis(SystemTime::now()).to_string(),
                });
            }
        }
    }

    /// Count a circuit-open skip. Skips are neither successes nor errors.
    pub fn record_skip(&self) {
        self.skipped_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped_total.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, name: &str) -> EndpointSnapshot {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let min = self.min_ms.load(Ordering::Relaxed);
        let max = self.max_ms.load(Ordering::Relaxed);

        let status_codes: BTreeMap<u16, u64> = self
            .status_codes
            .lock()
            .iter()
            .map(|(k, v)| (*k, *v))
            .collect();

        EndpointSnapshot {
            name: name.to_string(),
            requests,
            success: self.success_total.load(Ordering::Relaxed),
            errors: self.error_total.load(Ordering::Relaxed),
            timeouts: self.timeout_total.load(Ordering::Relaxed),
            skipped: self.skipped_total.load(Ordering::Relaxed),
            duration_ms_total: self.duration_ms_total.load(Ordering::Relaxed),
            min_ms: (requests > 0).then_some(min),
            max_ms: (requests > 0).then_some(max),
            status_codes,
            samples_ms: self.samples_ms.lock().clone(),
            error_records: self.errors.lock().clone(),
        }
    }
}

// CAS loops to keep min/max without losing updates under concurrent writers.
fn update_min(slot: &AtomicU64, value: u64) {
    let mut cur = slot.load(Ordering::Relaxed);
    while value < cur {
        match slot.compare_exchange_weak(cur, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(observed) => cur = observed,
        }
    }
}

fn update_max(slot: &AtomicU64, value: u64) {
    let mut cur = slot.load(Ordering::Relaxed);
    while value > cur {
        match slot.compare_exchange_weak(cur, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(observed) => cur = observed,
        }
    }
}
