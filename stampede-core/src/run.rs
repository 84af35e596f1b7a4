use rand::SeedableRng as _;
use rand::rngs::StdRng;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Barrier, Notify};
use tokio::time::Instant;

use stampede_metrics::{EndpointSnapshot, MetricsStore};

use crate::breaker::{BreakerTrip, CircuitBreaker};
use crate::config::RunPlan;
use crate::error::{Error, Result};
use crate::schedule::RampSchedule;
use crate::session::{SessionContext, run_session};
use crate::transport::Transport;
use crate::verify::{HealthOutcome, preflight};

/// Everything a renderer needs once the run has finished.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub scenario: String,
    pub health: HealthOutcome,
    pub elapsed: Duration,
    pub sessions: u64,
    pub executed: u64,
    pub skipped: u64,
    pub trips: Vec<BreakerTrip>,
    pub endpoints: Vec<EndpointSnapshot>,
}

#[derive(Debug, Default)]
struct VuTotals {
    sessions: u64,
    executed: u64,
    skipped: u64,
    trips: Vec<BreakerTrip>,
}

#[derive(Debug)]
struct StartSignal {
    started: std::sync::atomic::AtomicBool,
    notify: Notify,
}

impl StartSignal {
    fn new() -> Self {
        Self {
            started: std::sync::atomic::AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn start(&self) {
        self.started
            .store(true, std::sync::atomic::Ordering::Release);
        self.notify.notify_waiters();
    }

    async fn wait(&self) {
        while !self.started.load(std::sync::atomic::Ordering::Acquire) {
            self.notify.notified().await;
        }
    }
}

/// Validate, verify, then drive the full scenario to completion.
///
/// All virtual-user tasks are spawned up front and held at a barrier, so no
/// VU gets a head start and setup cost stays out of the measured window. Each
/// VU polls the ramp schedule and runs sessions while its index is within the
/// current target.
pub async fn run<T>(plan: RunPlan, transport: T) -> Result<RunSummary>
where
    T: Transport + Send + Sync + 'static,
{
    plan.validate()?;
    let health = preflight(&plan, &transport).await?;

    let plan = Arc::new(plan);
    let ctx = SessionContext {
        plan: Arc::clone(&plan),
        transport: Arc::new(transport),
        breaker: Arc::new(CircuitBreaker::new(plan.breaker)),
        metrics: Arc::new(MetricsStore::default()),
    };
    let schedule = Arc::new(RampSchedule::new(plan.scenario.stages.clone()));

    let max_vus = plan.max_vus();
    let ready_barrier = Arc::new(Barrier::new((max_vus as usize).saturating_add(1)));
    let start_signal = Arc::new(StartSignal::new());
    let run_started: Arc<OnceLock<Instant>> = Arc::new(OnceLock::new());

    let mut handles = Vec::with_capacity(max_vus as usize);
    for vu_id in 1..=max_vus {
        let ctx = ctx.clone();
        let schedule = Arc::clone(&schedule);
        let ready_barrier = Arc::clone(&ready_barrier);
        let start_signal = Arc::clone(&start_signal);
        let run_started = Arc::clone(&run_started);
        let seed = plan.seed;

        handles.push(tokio::spawn(async move {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(vu_id)),
                None => StdRng::from_entropy(),
            };

            ready_barrier.wait().await;
            start_signal.wait().await;
            let started = run_started.get().copied().unwrap_or_else(Instant::now);

            let mut totals = VuTotals::default();
            loop {
                let elapsed = started.elapsed();
                if schedule.is_done(elapsed) {
                    break;
                }

                if vu_id <= schedule.target_at(elapsed) {
                    let outcome = run_session(&ctx, &mut rng).await?;
                    totals.sessions += 1;
                    totals.executed += outcome.executed;
                    totals.skipped += outcome.skipped;
                    totals.trips.extend(outcome.trips);
                    // Re-check cadence between sessions.
                    tokio::time::sleep(Duration::from_millis(1)).await;
                } else {
                    tokio::time::sleep(schedule.next_recheck_in(elapsed, vu_id)).await;
                }
            }

            Ok::<VuTotals, Error>(totals)
        }));
    }

    ready_barrier.wait().await;
    let started = Instant::now();
    let _ = run_started.set(started);
    start_signal.start();

    let mut sessions = 0u64;
    let mut executed = 0u64;
    let mut skipped = 0u64;
    let mut trips = Vec::new();
    for h in handles {
        let totals = h.await??;
        sessions += totals.sessions;
        executed += totals.executed;
        skipped += totals.skipped;
        trips.extend(totals.trips);
    }

    Ok(RunSummary {
        scenario: plan.scenario.name.clone(),
        health,
        elapsed: started.elapsed(),
        sessions,
        executed,
        skipped,
        trips,
        endpoints: ctx.metrics.snapshot(),
    })
}
