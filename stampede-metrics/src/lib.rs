mod endpoint;
mod outcome;
mod store;

pub use endpoint::{EndpointMetrics, EndpointSnapshot, ErrorRecord};
pub use outcome::{FailureKind, RequestOutcome, Verdict};
pub use store::MetricsStore;
