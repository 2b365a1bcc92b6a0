use crate::clamp;
use crate::provider::{
    OptimizationProvider, OptimizationRequest, ProviderRecommendation, FALLBACK_CONFIDENCE_CEILING,
};
use chrono::Utc;
use common::{OptimizationResult, OptimizeError, ProviderError};
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics::{OPTIMIZATION_DURATION, OPTIMIZATION_FALLBACKS, OPTIMIZATION_REQUESTS};
use tracing::{info, warn};

/// Provider selection and fallback policy for one optimization request.
///
/// Provider-level failures never escape: a transient primary error is
/// retried once, anything else falls through to the deterministic
/// fallback. Only input errors and total provider exhaustion surface to
/// the caller.
pub struct Orchestrator {
    primary: Arc<dyn OptimizationProvider>,
    fallback: Arc<dyn OptimizationProvider>,
}

impl Orchestrator {
    pub fn new(
        primary: Arc<dyn OptimizationProvider>,
        fallback: Arc<dyn OptimizationProvider>,
    ) -> Self {
        Self { primary, fallback }
    }

    pub async fn optimize(
        &self,
        request: &OptimizationRequest,
    ) -> Result<OptimizationResult, OptimizeError> {
        request.context.validate()?;
        request.options.validate()?;

        let started = Instant::now();

        let (recommendation, provider_id) = match self.primary_with_retry(request).await {
            Ok(rec) => (rec, self.primary.id()),
            Err(primary_err) => {
                warn!(
                    camera_id = %request.context.camera_id,
                    provider = self.primary.id(),
                    error = %primary_err,
                    "primary provider failed, using fallback"
                );
                OPTIMIZATION_FALLBACKS
                    .with_label_values(&[fallback_reason(&primary_err)])
                    .inc();

                match self.fallback.recommend(request).await {
                    Ok(rec) => (rec, self.fallback.id()),
                    Err(fallback_err) => {
                        OPTIMIZATION_REQUESTS
                            .with_label_values(&[self.fallback.id(), "error"])
                            .inc();
                        return Err(OptimizeError::ProvidersExhausted {
                            primary: primary_err.to_string(),
                            fallback: fallback_err.to_string(),
                        });
                    }
                }
            }
        };

        let ProviderRecommendation {
            mut settings,
            confidence,
            explanation,
        } = recommendation;

        // Clamping runs on every result, whichever provider produced it.
        let warnings = clamp::clamp_to_capabilities(&mut settings, &request.capabilities);

        let mut confidence = confidence.clamp(0.0, 1.0);
        if provider_id == self.fallback.id() {
            confidence = confidence.min(FALLBACK_CONFIDENCE_CEILING);
        }

        let processing_ms = started.elapsed().as_millis() as u64;
        OPTIMIZATION_REQUESTS
            .with_label_values(&[provider_id, "ok"])
            .inc();
        OPTIMIZATION_DURATION
            .with_label_values(&[provider_id])
            .observe(started.elapsed().as_secs_f64());

        info!(
            camera_id = %request.context.camera_id,
            provider = provider_id,
            confidence,
            warnings = warnings.len(),
            processing_ms,
            "optimization completed"
        );

        Ok(OptimizationResult {
            settings,
            confidence,
            provider: provider_id.to_string(),
            warnings,
            explanation,
            processing_ms,
            created_at: Utc::now(),
        })
    }

    /// One retry, same parameters, transient errors only.
    async fn primary_with_retry(
        &self,
        request: &OptimizationRequest,
    ) -> Result<ProviderRecommendation, ProviderError> {
        match self.primary.recommend(request).await {
            Ok(rec) => Ok(rec),
            Err(e) if e.is_transient() => {
                info!(
                    provider = self.primary.id(),
                    error = %e,
                    "transient provider error, retrying once"
                );
                self.primary.recommend(request).await
            }
            Err(e) => Err(e),
        }
    }
}

fn fallback_reason(err: &ProviderError) -> &'static str {
    match err {
        ProviderError::Timeout(_) => "timeout",
        ProviderError::RateLimited(_) => "rate_limited",
        ProviderError::Transport(_) => "transport",
        ProviderError::InvalidResponse(_) => "invalid_response",
        ProviderError::Rejected(_) => "rejected",
    }
}
