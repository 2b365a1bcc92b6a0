//! Post-apply verification: diff intended settings against a re-read,
//! per attempted sub-group, with backend-declared numeric tolerance.

use camera_backends::VerifyTolerances;
use common::{CameraSettings, SubGroup};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Gain is reported in dB with device-dependent rounding; a fixed
/// epsilon avoids flagging representation noise.
const GAIN_TOLERANCE_DB: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingMismatch {
    pub group: SubGroup,
    pub setting: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verified: bool,
    pub mismatches: Vec<SettingMismatch>,
    /// Set when the verification re-read itself failed; the diff is
    /// then unavailable rather than empty.
    pub error: Option<String>,
}

impl VerificationResult {
    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            verified: false,
            mismatches: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Compare intended vs actual for the attempted sub-groups only.
///
/// Fields the backend did not expose on the re-read (`None` in actual)
/// are excluded from comparison; a backend that cannot report a value
/// has not contradicted it.
pub fn compare(
    intended: &CameraSettings,
    actual: &CameraSettings,
    attempted: &[SubGroup],
    tolerances: &VerifyTolerances,
) -> VerificationResult {
    let mut mismatches = Vec::new();

    if attempted.contains(&SubGroup::Stream) {
        if let (Some(want), Some(got)) = (&intended.stream, &actual.stream) {
            check_eq(&mut mismatches, SubGroup::Stream, "resolution", &want.resolution, &got.resolution);
            check_eq(&mut mismatches, SubGroup::Stream, "codec", &want.codec, &got.codec);
            check_u32(
                &mut mismatches,
                SubGroup::Stream,
                "fps",
                &want.fps,
                &got.fps,
                tolerances.fps,
            );
            check_f64(
                &mut mismatches,
                SubGroup::Stream,
                "bitrate_mbps",
                &want.bitrate_mbps,
                &got.bitrate_mbps,
                tolerances.bitrate_mbps,
            );
            check_eq(
                &mut mismatches,
                SubGroup::Stream,
                "keyframe_interval",
                &want.keyframe_interval,
                &got.keyframe_interval,
            );
            check_eq(
                &mut mismatches,
                SubGroup::Stream,
                "bitrate_mode",
                &want.bitrate_mode,
                &got.bitrate_mode,
            );
        }
    }

    if attempted.contains(&SubGroup::Exposure) {
        if let (Some(want), Some(got)) = (&intended.exposure, &actual.exposure) {
            check_eq(&mut mismatches, SubGroup::Exposure, "mode", &want.mode, &got.mode);
            check_eq(&mut mismatches, SubGroup::Exposure, "shutter", &want.shutter, &got.shutter);
            check_eq(&mut mismatches, SubGroup::Exposure, "iris", &want.iris, &got.iris);
            check_f64(
                &mut mismatches,
                SubGroup::Exposure,
                "gain_limit_db",
                &want.gain_limit_db,
                &got.gain_limit_db,
                GAIN_TOLERANCE_DB,
            );
            check_eq(
                &mut mismatches,
                SubGroup::Exposure,
                "wdr_level",
                &want.wdr_level,
                &got.wdr_level,
            );
            check_eq(
                &mut mismatches,
                SubGroup::Exposure,
                "backlight_compensation",
                &want.backlight_compensation,
                &got.backlight_compensation,
            );
            check_eq(
                &mut mismatches,
                SubGroup::Exposure,
                "highlight_compensation",
                &want.highlight_compensation,
                &got.highlight_compensation,
            );
        }
    }

    if attempted.contains(&SubGroup::LowLight) {
        if let (Some(want), Some(got)) = (&intended.low_light, &actual.low_light) {
            check_eq(&mut mismatches, SubGroup::LowLight, "ir_mode", &want.ir_mode, &got.ir_mode);
            check_eq(
                &mut mismatches,
                SubGroup::LowLight,
                "ir_intensity",
                &want.ir_intensity,
                &got.ir_intensity,
            );
            check_eq(
                &mut mismatches,
                SubGroup::LowLight,
                "day_night_mode",
                &want.day_night_mode,
                &got.day_night_mode,
            );
            check_eq(
                &mut mismatches,
                SubGroup::LowLight,
                "noise_reduction",
                &want.noise_reduction,
                &got.noise_reduction,
            );
            check_eq(
                &mut mismatches,
                SubGroup::LowLight,
                "slow_shutter",
                &want.slow_shutter,
                &got.slow_shutter,
            );
        }
    }

    if attempted.contains(&SubGroup::Image) {
        if let (Some(want), Some(got)) = (&intended.image, &actual.image) {
            check_eq(&mut mismatches, SubGroup::Image, "sharpness", &want.sharpness, &got.sharpness);
            check_eq(&mut mismatches, SubGroup::Image, "contrast", &want.contrast, &got.contrast);
            check_eq(
                &mut mismatches,
                SubGroup::Image,
                "saturation",
                &want.saturation,
                &got.saturation,
            );
            check_eq(
                &mut mismatches,
                SubGroup::Image,
                "brightness",
                &want.brightness,
                &got.brightness,
            );
            check_eq(
                &mut mismatches,
                SubGroup::Image,
                "white_balance",
                &want.white_balance,
                &got.white_balance,
            );
        }
    }

    VerificationResult {
        verified: mismatches.is_empty(),
        mismatches,
        error: None,
    }
}

/// Exact comparison; skipped when either side is absent.
fn check_eq<T: PartialEq + Debug>(
    mismatches: &mut Vec<SettingMismatch>,
    group: SubGroup,
    setting: &str,
    intended: &Option<T>,
    actual: &Option<T>,
) {
    if let (Some(want), Some(got)) = (intended, actual) {
        if want != got {
            mismatches.push(SettingMismatch {
                group,
                setting: setting.to_string(),
                expected: format!("{want:?}"),
                actual: format!("{got:?}"),
            });
        }
    }
}

fn check_f64(
    mismatches: &mut Vec<SettingMismatch>,
    group: SubGroup,
    setting: &str,
    intended: &Option<f64>,
    actual: &Option<f64>,
    tolerance: f64,
) {
    if let (Some(want), Some(got)) = (intended, actual) {
        if (want - got).abs() > tolerance {
            mismatches.push(SettingMismatch {
                group,
                setting: setting.to_string(),
                expected: format!("{want}"),
                actual: format!("{got}"),
            });
        }
    }
}

fn check_u32(
    mismatches: &mut Vec<SettingMismatch>,
    group: SubGroup,
    setting: &str,
    intended: &Option<u32>,
    actual: &Option<u32>,
    tolerance: u32,
) {
    if let (Some(want), Some(got)) = (intended, actual) {
        if want.abs_diff(*got) > tolerance {
            mismatches.push(SettingMismatch {
                group,
                setting: setting.to_string(),
                expected: want.to_string(),
                actual: got.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ImageSettings, StreamSettings};

    fn stream(bitrate: f64, fps: u32) -> CameraSettings {
        CameraSettings {
            stream: Some(StreamSettings {
                resolution: Some("1920x1080".to_string()),
                fps: Some(fps),
                bitrate_mbps: Some(bitrate),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn identical_settings_verify_clean() {
        let intended = stream(4.0, 15);
        let result = compare(
            &intended,
            &intended.clone(),
            &[SubGroup::Stream],
            &VerifyTolerances::default(),
        );
        assert!(result.verified);
        assert!(result.mismatches.is_empty());
        assert!(result.error.is_none());
    }

    #[test]
    fn bitrate_within_tolerance_passes() {
        let intended = stream(4.0, 15);
        let actual = stream(4.096, 15);
        let tolerances = VerifyTolerances {
            bitrate_mbps: 0.1,
            fps: 0,
        };
        assert!(compare(&intended, &actual, &[SubGroup::Stream], &tolerances).verified);
    }

    #[test]
    fn bitrate_outside_tolerance_is_a_mismatch() {
        let intended = stream(4.0, 15);
        let actual = stream(6.0, 15);
        let tolerances = VerifyTolerances {
            bitrate_mbps: 0.1,
            fps: 0,
        };
        let result = compare(&intended, &actual, &[SubGroup::Stream], &tolerances);
        assert!(!result.verified);
        assert_eq!(result.mismatches.len(), 1);
        let mismatch = &result.mismatches[0];
        assert_eq!(mismatch.group, SubGroup::Stream);
        assert_eq!(mismatch.setting, "bitrate_mbps");
        assert_eq!(mismatch.expected, "4");
        assert_eq!(mismatch.actual, "6");
    }

    #[test]
    fn unattempted_groups_are_ignored() {
        let intended = CameraSettings {
            image: Some(ImageSettings {
                brightness: Some(50),
                ..Default::default()
            }),
            ..stream(4.0, 15)
        };
        let actual = stream(4.0, 15); // image group never applied, differs
        let result = compare(
            &intended,
            &actual,
            &[SubGroup::Stream],
            &VerifyTolerances::default(),
        );
        assert!(result.verified);
    }

    #[test]
    fn fields_absent_on_read_are_excluded() {
        let intended = stream(4.0, 15);
        let mut actual = stream(4.0, 15);
        if let Some(s) = &mut actual.stream {
            s.resolution = None; // backend does not report resolution
        }
        let result = compare(
            &intended,
            &actual,
            &[SubGroup::Stream],
            &VerifyTolerances::default(),
        );
        assert!(result.verified);
    }

    #[test]
    fn unavailable_result_carries_error_and_no_mismatches() {
        let result = VerificationResult::unavailable("re-read timed out");
        assert!(!result.verified);
        assert!(result.mismatches.is_empty());
        assert_eq!(result.error.as_deref(), Some("re-read timed out"));
    }
}
