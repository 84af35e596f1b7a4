mod breaker;
mod error;
mod retry;
mod schedule;
mod select;
mod session;
mod transport;
mod verify;

pub mod config;
pub mod report;
pub mod run;

pub use stampede_metrics::{EndpointSnapshot, ErrorRecord, MetricsStore, RequestOutcome};

pub use breaker::{BreakerConfig, BreakerTrip, CircuitBreaker};
pub use error::{Error, Result};
pub use retry::with_retry;
pub use schedule::RampSchedule;
pub use select::pick_weighted;
pub use session::{Execution, SessionContext, SessionOutcome, run_session};
pub use transport::{HttpClient, HttpRequest, HttpResponse, Transport, TransportError};
pub use verify::{HealthOutcome, preflight};
