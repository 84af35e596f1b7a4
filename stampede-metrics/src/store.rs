use dashmap::DashMap;
use std::sync::Arc;

use crate::endpoint::{EndpointMetrics, EndpointSnapshot};

/// Process-wide metrics store, shared by every concurrent session.
///
/// Endpoint entries are created lazily on first use and keyed by the
/// endpoint's normalized slug.
#[derive(Debug, Default)]
pub struct MetricsStore {
    endpoints: DashMap<Arc<str>, Arc<EndpointMetrics>>,
}

impl MetricsStore {
    /// Handle for one endpoint's metrics, creating the entry if needed.
    pub fn endpoint(&self, slug: &str) -> Arc<EndpointMetrics> {
        if let Some(existing) = self.endpoints.get(slug) {
            return existing.clone();
        }

        self.endpoints
            .entry(Arc::from(slug))
            .or_default()
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Copy out all endpoint metrics, sorted by slug.
    pub fn snapshot(&self) -> Vec<EndpointSnapshot> {
        let mut out: Vec<EndpointSnapshot> = self
            .endpoints
            .iter()
            .map(|entry| entry.value().snapshot(entry.key()))
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}
