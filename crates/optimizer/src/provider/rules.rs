use super::{
    OptimizationProvider, OptimizationRequest, ProviderRecommendation, FALLBACK_CONFIDENCE_CEILING,
};
use async_trait::async_trait;
use common::{
    BitrateMode, CameraPurpose, CameraSettings, DayNightMode, ExposureMode, ExposureSettings,
    ImageSettings, IrMode, LowLightSettings, ProviderError, SceneType, StreamSettings,
    WhiteBalanceMode,
};

/// Deterministic fallback provider.
///
/// A pure function of the request: no I/O, no failure path. This is the
/// availability floor of the pipeline — it must produce a usable result
/// for every scene/purpose pair even when everything else is down.
pub struct RuleBasedProvider;

impl RuleBasedProvider {
    pub fn new() -> Self {
        Self
    }

    /// Scene-type baseline, tuned afterwards by purpose and hints.
    fn scene_baseline(scene: SceneType) -> CameraSettings {
        let (resolution, fps, bitrate, keyframe, wdr, noise, ir) = match scene {
            // High-contrast doorways: strong WDR, moderate motion.
            SceneType::Entrance => ("2560x1440", 15, 4.0, 30, 2, 2, IrMode::Auto),
            // Wide area, headlight glare at night.
            SceneType::Parking => ("2560x1440", 12, 4.5, 24, 1, 3, IrMode::Auto),
            SceneType::Hallway => ("1920x1080", 12, 2.5, 24, 0, 2, IrMode::Auto),
            // Long sightlines, darkness more than contrast.
            SceneType::Perimeter => ("2560x1440", 10, 4.0, 20, 0, 3, IrMode::On),
            // Close range, indoor lighting, transaction detail.
            SceneType::CashWrap => ("1920x1080", 15, 3.0, 30, 1, 1, IrMode::Off),
            SceneType::Lobby => ("2560x1440", 12, 3.5, 24, 2, 2, IrMode::Auto),
            SceneType::Warehouse => ("1920x1080", 10, 3.0, 20, 0, 3, IrMode::Auto),
            SceneType::Stairwell => ("1280x720", 12, 1.5, 24, 1, 2, IrMode::Auto),
            SceneType::LoadingDock => ("1920x1080", 12, 3.5, 24, 2, 2, IrMode::Auto),
        };

        CameraSettings {
            stream: Some(StreamSettings {
                resolution: Some(resolution.to_string()),
                codec: Some(common::VideoCodec::H265),
                fps: Some(fps),
                bitrate_mbps: Some(bitrate),
                keyframe_interval: Some(keyframe),
                bitrate_mode: Some(BitrateMode::Variable),
            }),
            exposure: Some(ExposureSettings {
                mode: Some(ExposureMode::Auto),
                shutter: Some("1/30".to_string()),
                iris: None,
                gain_limit_db: Some(30.0),
                wdr_level: Some(wdr),
                backlight_compensation: Some(false),
                highlight_compensation: Some(false),
            }),
            low_light: Some(LowLightSettings {
                ir_mode: Some(ir),
                ir_intensity: Some(80),
                day_night_mode: Some(DayNightMode::Auto),
                noise_reduction: Some(noise),
                slow_shutter: Some(false),
            }),
            image: Some(ImageSettings {
                sharpness: Some(50),
                contrast: Some(50),
                saturation: Some(50),
                brightness: Some(50),
                white_balance: Some(WhiteBalanceMode::Auto),
            }),
        }
    }

    fn adjust_for_purpose(settings: &mut CameraSettings, purpose: CameraPurpose) {
        let stream = settings.stream.get_or_insert_with(Default::default);
        let exposure = settings.exposure.get_or_insert_with(Default::default);
        let low_light = settings.low_light.get_or_insert_with(Default::default);
        let image = settings.image.get_or_insert_with(Default::default);

        match purpose {
            CameraPurpose::Facial => {
                // Faces need temporal detail and tamed highlights.
                stream.fps = stream.fps.map(|fps| fps.max(15));
                exposure.shutter = Some("1/60".to_string());
                exposure.wdr_level = exposure.wdr_level.map(|level| level.max(2));
                image.sharpness = Some(60);
            }
            CameraPurpose::Plates => {
                // Freeze motion and keep gain down; blown-out plates are
                // unreadable regardless of resolution.
                stream.fps = stream.fps.map(|fps| fps.max(25));
                exposure.mode = Some(ExposureMode::ShutterPriority);
                exposure.shutter = Some("1/500".to_string());
                exposure.gain_limit_db = Some(18.0);
                exposure.highlight_compensation = Some(true);
                low_light.ir_mode = Some(IrMode::On);
                low_light.slow_shutter = Some(false);
            }
            CameraPurpose::Overview => {
                stream.fps = stream.fps.map(|fps| fps.min(10));
                stream.bitrate_mbps = stream.bitrate_mbps.map(|b| (b * 0.75 * 10.0).round() / 10.0);
            }
            CameraPurpose::Evidence => {
                stream.bitrate_mbps = stream.bitrate_mbps.map(|b| (b * 1.25 * 10.0).round() / 10.0);
                stream.keyframe_interval = stream.keyframe_interval.map(|k| k.min(20));
                stream.bitrate_mode = Some(BitrateMode::Constant);
            }
            CameraPurpose::Counting => {
                stream.fps = stream.fps.map(|fps| fps.clamp(10, 15));
                image.contrast = Some(55);
            }
        }
    }

    fn apply_hints(settings: &mut CameraSettings, request: &OptimizationRequest) {
        if let Some(stream) = &mut settings.stream {
            if let (Some(limit), Some(bitrate)) =
                (request.options.bandwidth_limit_mbps, stream.bitrate_mbps)
            {
                if bitrate > limit {
                    stream.bitrate_mbps = Some(limit);
                }
            }
            // Long retention targets trade bitrate for storage span.
            if request.options.retention_days.is_some_and(|days| days > 60) {
                stream.bitrate_mbps =
                    stream.bitrate_mbps.map(|b| (b * 0.8 * 10.0).round() / 10.0);
                stream.bitrate_mode = Some(BitrateMode::Variable);
            }
        }
    }

    fn confidence_for(scene: SceneType, purpose: CameraPurpose) -> f64 {
        // Pairs the rule tables model well score higher; everything
        // stays strictly below the fallback ceiling.
        let base = 0.55;
        let bonus = match (scene, purpose) {
            (SceneType::Entrance, CameraPurpose::Facial) => 0.10,
            (SceneType::Parking, CameraPurpose::Plates) => 0.10,
            (SceneType::Perimeter, CameraPurpose::Overview) => 0.08,
            (SceneType::CashWrap, CameraPurpose::Evidence) => 0.08,
            (SceneType::Lobby, CameraPurpose::Counting) => 0.06,
            _ => 0.03,
        };
        base + bonus
    }
}

impl Default for RuleBasedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OptimizationProvider for RuleBasedProvider {
    fn id(&self) -> &'static str {
        "rules"
    }

    fn name(&self) -> &'static str {
        "Deterministic rule tables"
    }

    fn requires_network(&self) -> bool {
        false
    }

    async fn recommend(
        &self,
        request: &OptimizationRequest,
    ) -> Result<ProviderRecommendation, ProviderError> {
        let scene = request.context.scene_type;
        let purpose = request.context.purpose;

        let mut settings = Self::scene_baseline(scene);
        Self::adjust_for_purpose(&mut settings, purpose);
        Self::apply_hints(&mut settings, request);

        Ok(ProviderRecommendation {
            settings,
            confidence: Self::confidence_for(scene, purpose),
            explanation: format!(
                "Rule-based profile for a {scene:?} scene optimized for {purpose:?} use",
            ),
        })
    }
}
