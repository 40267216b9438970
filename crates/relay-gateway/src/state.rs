use std::sync::Arc;

use relay_engine::memory::MemoryTelemetry;
use relay_engine::Engine;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub telemetry: Arc<MemoryTelemetry>,
    pub metrics: Arc<Metrics>,
}
