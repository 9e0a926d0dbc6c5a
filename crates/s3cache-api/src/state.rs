//! Application state

use metrics_exporter_prometheus::PrometheusHandle;
use s3cache_core::{CacheStore, ProxyService};
use std::sync::Arc;

/// Handle used to render the Prometheus exposition
pub type MetricsHandle = PrometheusHandle;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ProxyService>,
    pub cache: Arc<dyn CacheStore>,
}

impl AppState {
    pub fn new(service: Arc<ProxyService>) -> Self {
        let cache = service.fetcher().cache().clone();
        Self { service, cache }
    }
}
