use crate::settings::CameraSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scored recommendation from the optimization pipeline.
///
/// Built once per request and never mutated afterwards; the apply
/// engine consumes a copy of `settings`, not this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub settings: CameraSettings,
    /// In [0.0, 1.0]. Fallback results are capped below the primary
    /// provider's typical range so callers can tell them apart without
    /// inspecting `provider`.
    pub confidence: f64,
    pub provider: String,
    /// Constraint violations that were auto-corrected or flagged during
    /// capability clamping.
    pub warnings: Vec<String>,
    pub explanation: String,
    pub processing_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_round_trips_through_json() {
        let result = OptimizationResult {
            settings: CameraSettings::default(),
            confidence: 0.82,
            provider: "vision".to_string(),
            warnings: vec!["bitrate clamped".to_string()],
            explanation: "entrance scene, facial priority".to_string(),
            processing_ms: 412,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&result).unwrap();
        let back: OptimizationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
