pub mod clamp;
pub mod orchestrator;
pub mod provider;

pub use orchestrator::Orchestrator;
pub use provider::rules::RuleBasedProvider;
pub use provider::vision::{VisionProvider, VisionProviderConfig};
pub use provider::{
    OptimizationProvider, OptimizationRequest, ProviderRecommendation,
    FALLBACK_CONFIDENCE_CEILING,
};
