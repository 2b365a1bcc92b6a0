use serde::{Deserialize, Serialize};
use std::fmt;

/// The four independently applicable configuration sub-groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubGroup {
    Stream,
    Exposure,
    LowLight,
    Image,
}

impl SubGroup {
    /// Fixed apply order: stream first, image tuning last.
    pub const ALL: [SubGroup; 4] = [
        SubGroup::Stream,
        SubGroup::Exposure,
        SubGroup::LowLight,
        SubGroup::Image,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubGroup::Stream => "stream",
            SubGroup::Exposure => "exposure",
            SubGroup::LowLight => "low_light",
            SubGroup::Image => "image",
        }
    }
}

impl fmt::Display for SubGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    H265,
    Mjpeg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitrateMode {
    Constant,
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureMode {
    Auto,
    Manual,
    ShutterPriority,
    IrisPriority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IrMode {
    Auto,
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayNightMode {
    Auto,
    Day,
    Night,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhiteBalanceMode {
    Auto,
    Indoor,
    Outdoor,
    Manual,
}

/// Encoder configuration for the primary stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSettings {
    /// "WIDTHxHEIGHT", e.g. "1920x1080".
    pub resolution: Option<String>,
    pub codec: Option<VideoCodec>,
    pub fps: Option<u32>,
    pub bitrate_mbps: Option<f64>,
    /// GOP length in frames.
    pub keyframe_interval: Option<u32>,
    pub bitrate_mode: Option<BitrateMode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExposureSettings {
    pub mode: Option<ExposureMode>,
    /// "1/N" seconds, e.g. "1/250".
    pub shutter: Option<String>,
    pub iris: Option<String>,
    pub gain_limit_db: Option<f64>,
    /// 0 = off; higher values strengthen WDR.
    pub wdr_level: Option<u8>,
    pub backlight_compensation: Option<bool>,
    pub highlight_compensation: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LowLightSettings {
    pub ir_mode: Option<IrMode>,
    /// 0-100.
    pub ir_intensity: Option<u8>,
    pub day_night_mode: Option<DayNightMode>,
    /// 0 = off; typical cameras expose 0-5.
    pub noise_reduction: Option<u8>,
    pub slow_shutter: Option<bool>,
}

/// Image tuning, all 0-100 scales.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageSettings {
    pub sharpness: Option<u8>,
    pub contrast: Option<u8>,
    pub saturation: Option<u8>,
    pub brightness: Option<u8>,
    pub white_balance: Option<WhiteBalanceMode>,
}

/// Canonical, backend-neutral camera configuration.
///
/// A `None` sub-group means the backend did not expose that group on a
/// read; it is never an implicit "all defaults". The same type carries
/// both current and recommended settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub stream: Option<StreamSettings>,
    pub exposure: Option<ExposureSettings>,
    pub low_light: Option<LowLightSettings>,
    pub image: Option<ImageSettings>,
}

impl CameraSettings {
    pub fn is_empty(&self) -> bool {
        self.stream.is_none()
            && self.exposure.is_none()
            && self.low_light.is_none()
            && self.image.is_none()
    }

    pub fn has_group(&self, group: SubGroup) -> bool {
        match group {
            SubGroup::Stream => self.stream.is_some(),
            SubGroup::Exposure => self.exposure.is_some(),
            SubGroup::LowLight => self.low_light.is_some(),
            SubGroup::Image => self.image.is_some(),
        }
    }

    pub fn present_groups(&self) -> Vec<SubGroup> {
        SubGroup::ALL
            .into_iter()
            .filter(|g| self.has_group(*g))
            .collect()
    }

    /// Copy holding only the named sub-group, used to apply groups one
    /// at a time.
    pub fn only(&self, group: SubGroup) -> CameraSettings {
        let mut out = CameraSettings::default();
        match group {
            SubGroup::Stream => out.stream = self.stream.clone(),
            SubGroup::Exposure => out.exposure = self.exposure.clone(),
            SubGroup::LowLight => out.low_light = self.low_light.clone(),
            SubGroup::Image => out.image = self.image.clone(),
        }
        out
    }
}
