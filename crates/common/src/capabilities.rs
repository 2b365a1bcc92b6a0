use crate::settings::{IrMode, VideoCodec};
use serde::{Deserialize, Serialize};

/// Supported gain range in dB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainRange {
    pub min_db: f64,
    pub max_db: f64,
}

impl GainRange {
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min_db, self.max_db)
    }
}

/// What a camera reports it can do.
///
/// Every constrained field is an `Option`: `None` means the backend
/// could not determine the constraint and the value is UNCONSTRAINED,
/// not unsupported. Recommendation clamping skips `None` fields
/// entirely. Feature flags are always known (backends report them
/// directly or they default to false).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraCapabilities {
    /// Ordered largest-first, e.g. ["3840x2160", "1920x1080", ...].
    pub resolutions: Option<Vec<String>>,
    pub codecs: Option<Vec<VideoCodec>>,
    pub min_fps: Option<u32>,
    pub max_fps: Option<u32>,
    pub max_bitrate_mbps: Option<f64>,
    pub wdr_levels: Option<Vec<u8>>,
    pub shutter_modes: Option<Vec<String>>,
    pub gain_range_db: Option<GainRange>,
    pub ir_modes: Option<Vec<IrMode>>,
    pub noise_reduction_levels: Option<Vec<u8>>,

    pub has_wdr: bool,
    pub has_ir: bool,
    pub has_blc: bool,
    pub has_hlc: bool,
    pub has_ptz: bool,
    pub lpr_capable: bool,
}

impl CameraCapabilities {
    /// Maximally permissive capability set: nothing is constrained and
    /// every feature is available. Used when a backend cannot report
    /// capabilities and as the fallback provider's validation floor.
    pub fn unconstrained() -> Self {
        Self {
            resolutions: None,
            codecs: None,
            min_fps: None,
            max_fps: None,
            max_bitrate_mbps: None,
            wdr_levels: None,
            shutter_modes: None,
            gain_range_db: None,
            ir_modes: None,
            noise_reduction_levels: None,
            has_wdr: true,
            has_ir: true,
            has_blc: true,
            has_hlc: true,
            has_ptz: true,
            lpr_capable: true,
        }
    }

    pub fn supports_resolution(&self, resolution: &str) -> bool {
        match &self.resolutions {
            Some(list) => list.iter().any(|r| r == resolution),
            None => true,
        }
    }

    pub fn supports_codec(&self, codec: VideoCodec) -> bool {
        match &self.codecs {
            Some(list) => list.contains(&codec),
            None => true,
        }
    }
}
