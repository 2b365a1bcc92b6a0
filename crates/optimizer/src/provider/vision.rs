use super::{OptimizationProvider, OptimizationRequest, ProviderRecommendation};
use anyhow::Result;
use async_trait::async_trait;
use common::{CameraSettings, ProviderError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct VisionProviderConfig {
    /// Full URL of the reasoning service's analyze endpoint.
    pub endpoint: String,
    pub api_key: String,
    /// Model identifier passed through to the service.
    pub model: String,
    pub timeout_secs: u64,
}

/// Request document for the reasoning service's analyze operation.
#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    model: &'a str,
    scene: SceneDocument<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_settings: Option<&'a CameraSettings>,
    capabilities: &'a common::CameraCapabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SceneDocument<'a> {
    scene_type: common::SceneType,
    purpose: common::CameraPurpose,
    #[serde(skip_serializing_if = "Option::is_none")]
    vendor: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bandwidth_limit_mbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retention_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    settings: CameraSettings,
    confidence: f64,
    #[serde(default)]
    explanation: String,
}

/// Primary provider backed by a vision-capable reasoning service.
pub struct VisionProvider {
    config: VisionProviderConfig,
    http: reqwest::Client,
}

impl VisionProvider {
    pub fn new(config: VisionProviderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, http })
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> ProviderError {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            ProviderError::RateLimited(format!("{status}"))
        } else if status.is_server_error() {
            ProviderError::Transport(format!("{status}: {body}"))
        } else {
            ProviderError::Rejected(format!("{status}: {body}"))
        }
    }

    fn validate(response: AnalyzeResponse) -> Result<ProviderRecommendation, ProviderError> {
        if !(0.0..=1.0).contains(&response.confidence) {
            return Err(ProviderError::InvalidResponse(format!(
                "confidence {} outside [0, 1]",
                response.confidence
            )));
        }
        if response.settings.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "no settings sub-group present".to_string(),
            ));
        }
        Ok(ProviderRecommendation {
            settings: response.settings,
            confidence: response.confidence,
            explanation: response.explanation,
        })
    }
}

#[async_trait]
impl OptimizationProvider for VisionProvider {
    fn id(&self) -> &'static str {
        "vision"
    }

    fn name(&self) -> &'static str {
        "Vision reasoning service"
    }

    fn requires_network(&self) -> bool {
        true
    }

    async fn recommend(
        &self,
        request: &OptimizationRequest,
    ) -> Result<ProviderRecommendation, ProviderError> {
        let body = AnalyzeRequest {
            model: &self.config.model,
            scene: SceneDocument {
                scene_type: request.context.scene_type,
                purpose: request.context.purpose,
                vendor: request.context.vendor.as_deref(),
                model: request.context.model.as_deref(),
                location: request.context.location.as_deref(),
                bandwidth_limit_mbps: request.options.bandwidth_limit_mbps,
                retention_days: request.options.retention_days,
                notes: request.options.notes.as_deref(),
            },
            current_settings: request.current.as_ref(),
            capabilities: &request.capabilities,
            image: request.options.scene_image.as_deref(),
        };

        debug!(
            camera_id = %request.context.camera_id,
            endpoint = %self.config.endpoint,
            has_image = request.options.scene_image.is_some(),
            "requesting vision analysis"
        );

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &text));
        }

        let parsed: AnalyzeResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Self::validate(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_confidence_is_invalid() {
        let response = AnalyzeResponse {
            settings: CameraSettings {
                stream: Some(Default::default()),
                ..Default::default()
            },
            confidence: 1.4,
            explanation: String::new(),
        };
        assert!(matches!(
            VisionProvider::validate(response),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn empty_settings_are_invalid() {
        let response = AnalyzeResponse {
            settings: CameraSettings::default(),
            confidence: 0.9,
            explanation: "looks fine".to_string(),
        };
        assert!(matches!(
            VisionProvider::validate(response),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            VisionProvider::classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, ""),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            VisionProvider::classify_status(reqwest::StatusCode::BAD_GATEWAY, ""),
            ProviderError::Transport(_)
        ));
        assert!(matches!(
            VisionProvider::classify_status(reqwest::StatusCode::BAD_REQUEST, ""),
            ProviderError::Rejected(_)
        ));
    }

    #[test]
    fn analyze_response_parses_wire_document() {
        let json = r#"{
            "settings": {"stream": {"resolution": "1920x1080", "fps": 15, "bitrate_mbps": 4.0}},
            "confidence": 0.88,
            "explanation": "entrance with strong backlight"
        }"#;
        let parsed: AnalyzeResponse = serde_json::from_str(json).unwrap();
        let rec = VisionProvider::validate(parsed).unwrap();
        assert_eq!(rec.confidence, 0.88);
        assert_eq!(
            rec.settings.stream.unwrap().resolution,
            Some("1920x1080".to_string())
        );
    }
}
