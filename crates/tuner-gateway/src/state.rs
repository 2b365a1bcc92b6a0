use apply_engine::ApplyEngine;
use optimizer::Orchestrator;
use std::sync::Arc;

#[derive(Clone)]
pub struct GatewayState {
    pub orchestrator: Arc<Orchestrator>,
    pub engine: Arc<ApplyEngine>,
}

impl GatewayState {
    pub fn new(orchestrator: Arc<Orchestrator>, engine: Arc<ApplyEngine>) -> Self {
        Self {
            orchestrator,
            engine,
        }
    }
}
