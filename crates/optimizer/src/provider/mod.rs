pub mod rules;
pub mod vision;

use async_trait::async_trait;
use common::{
    CameraCapabilities, CameraContext, CameraSettings, OptimizationContext, ProviderError,
};
use serde::{Deserialize, Serialize};

/// Upper bound on fallback-provider confidence. The vision provider
/// typically reports 0.8+, so capping the fallback below this lets
/// callers spot a degraded recommendation from the score alone.
pub const FALLBACK_CONFIDENCE_CEILING: f64 = 0.70;

/// Everything a provider gets to work with for one recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub context: CameraContext,
    pub capabilities: CameraCapabilities,
    pub current: Option<CameraSettings>,
    pub options: OptimizationContext,
}

/// Raw provider output, before capability clamping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRecommendation {
    pub settings: CameraSettings,
    pub confidence: f64,
    pub explanation: String,
}

/// A source of settings recommendations. Implementations declare
/// whether they need the network so the orchestrator can reason about
/// availability without inspecting concrete types.
#[async_trait]
pub trait OptimizationProvider: Send + Sync {
    /// Stable identifier recorded on every result (e.g. "vision").
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    /// Whether recommendations depend on an external service.
    fn requires_network(&self) -> bool;

    async fn recommend(
        &self,
        request: &OptimizationRequest,
    ) -> Result<ProviderRecommendation, ProviderError>;
}
