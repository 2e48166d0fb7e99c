use std::sync::Arc;

use httpmon_core::{ResponseCounters, RunnerRegistry};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RunnerRegistry>,
    pub counters: Arc<ResponseCounters>,
}

impl AppState {
    pub fn new(registry: Arc<RunnerRegistry>, counters: Arc<ResponseCounters>) -> Self {
        Self { registry, counters }
    }
}
