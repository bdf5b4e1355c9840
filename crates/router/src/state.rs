//! Router state: shared, read-only after boot apart from atomic counters.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::conf::RouterConfig;
use crate::metrics::RouterMetrics;
use crate::route::RecordRouter;
use crate::sink::RecordSink;

pub struct RouterState {
    pub config: RouterConfig,
    pub router: RecordRouter,
    pub sink: Arc<dyn RecordSink>,
    pub metrics: Arc<RouterMetrics>,
    pub started_at: DateTime<Utc>,
}

impl RouterState {
    pub fn new(config: RouterConfig, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            router: RecordRouter::new(config.routing.clone()),
            config,
            sink,
            metrics: Arc::new(RouterMetrics::new()),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<RouterState>;
