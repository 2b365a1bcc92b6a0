//! Capability clamping: repair a recommendation so every field is a
//! member of the camera's supported set, appending a warning for each
//! substitution. Runs on every result regardless of provider.

use common::{CameraCapabilities, CameraSettings, IrMode};
use telemetry::metrics::CLAMP_WARNINGS;

pub fn clamp_to_capabilities(
    settings: &mut CameraSettings,
    caps: &CameraCapabilities,
) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Some(stream) = &mut settings.stream {
        if let (Some(resolution), Some(supported)) = (&stream.resolution, &caps.resolutions) {
            if !supported.iter().any(|r| r == resolution) {
                if let Some(nearest) = nearest_resolution(supported, resolution) {
                    push_warning(
                        &mut warnings,
                        "resolution",
                        format!(
                            "resolution {resolution} is not supported; substituted nearest supported {nearest}"
                        ),
                    );
                    stream.resolution = Some(nearest);
                }
            }
        }

        if let (Some(codec), Some(supported)) = (stream.codec, &caps.codecs) {
            if !supported.contains(&codec) {
                if let Some(&replacement) = supported
                    .iter()
                    .find(|c| **c == common::VideoCodec::H264)
                    .or_else(|| supported.first())
                {
                    push_warning(
                        &mut warnings,
                        "codec",
                        format!(
                            "codec {codec:?} is not supported; substituted {replacement:?}"
                        ),
                    );
                    stream.codec = Some(replacement);
                }
            }
        }

        if let (Some(fps), Some(max)) = (stream.fps, caps.max_fps) {
            if fps > max {
                push_warning(
                    &mut warnings,
                    "fps",
                    format!("fps {fps} exceeds supported maximum {max}; clamped to {max}"),
                );
                stream.fps = Some(max);
            }
        }
        if let (Some(fps), Some(min)) = (stream.fps, caps.min_fps) {
            if fps < min {
                push_warning(
                    &mut warnings,
                    "fps",
                    format!("fps {fps} is below supported minimum {min}; raised to {min}"),
                );
                stream.fps = Some(min);
            }
        }

        if let (Some(bitrate), Some(max)) = (stream.bitrate_mbps, caps.max_bitrate_mbps) {
            if bitrate > max {
                push_warning(
                    &mut warnings,
                    "bitrate_mbps",
                    format!(
                        "bitrate {bitrate} Mbps exceeds supported maximum {max} Mbps; clamped to {max} Mbps"
                    ),
                );
                stream.bitrate_mbps = Some(max);
            }
        }
    }

    if let Some(exposure) = &mut settings.exposure {
        if let Some(level) = exposure.wdr_level {
            if !caps.has_wdr && level > 0 {
                push_warning(
                    &mut warnings,
                    "wdr_level",
                    format!("wdr_level {level} requested but camera has no WDR; removed"),
                );
                exposure.wdr_level = None;
            } else if let Some(levels) = &caps.wdr_levels {
                if !levels.contains(&level) {
                    if let Some(nearest) = nearest_u8(levels, level) {
                        push_warning(
                            &mut warnings,
                            "wdr_level",
                            format!(
                                "wdr_level {level} is not supported; substituted nearest supported {nearest}"
                            ),
                        );
                        exposure.wdr_level = Some(nearest);
                    }
                }
            }
        }

        if let (Some(shutter), Some(supported)) = (&exposure.shutter, &caps.shutter_modes) {
            if !supported.iter().any(|s| s == shutter) {
                if let Some(nearest) = nearest_shutter(supported, shutter) {
                    push_warning(
                        &mut warnings,
                        "shutter",
                        format!(
                            "shutter {shutter} is not supported; substituted nearest supported {nearest}"
                        ),
                    );
                    exposure.shutter = Some(nearest);
                }
            }
        }

        if let (Some(gain), Some(range)) = (exposure.gain_limit_db, caps.gain_range_db) {
            let clamped = range.clamp(gain);
            if (clamped - gain).abs() > f64::EPSILON {
                push_warning(
                    &mut warnings,
                    "gain_limit_db",
                    format!(
                        "gain limit {gain} dB outside supported range [{}, {}]; clamped to {clamped} dB",
                        range.min_db, range.max_db
                    ),
                );
                exposure.gain_limit_db = Some(clamped);
            }
        }

        if exposure.backlight_compensation == Some(true) && !caps.has_blc {
            push_warning(
                &mut warnings,
                "backlight_compensation",
                "backlight compensation requested but camera has no BLC; disabled".to_string(),
            );
            exposure.backlight_compensation = Some(false);
        }
        if exposure.highlight_compensation == Some(true) && !caps.has_hlc {
            push_warning(
                &mut warnings,
                "highlight_compensation",
                "highlight compensation requested but camera has no HLC; disabled".to_string(),
            );
            exposure.highlight_compensation = Some(false);
        }
    }

    if let Some(low_light) = &mut settings.low_light {
        if let Some(ir) = low_light.ir_mode {
            if !caps.has_ir && ir != IrMode::Off {
                push_warning(
                    &mut warnings,
                    "ir_mode",
                    format!("ir_mode {ir:?} requested but camera has no IR; removed"),
                );
                low_light.ir_mode = None;
                low_light.ir_intensity = None;
            } else if let Some(modes) = &caps.ir_modes {
                if !modes.contains(&ir) {
                    let replacement = modes
                        .iter()
                        .find(|m| **m == IrMode::Auto)
                        .or_else(|| modes.first())
                        .copied();
                    if let Some(replacement) = replacement {
                        push_warning(
                            &mut warnings,
                            "ir_mode",
                            format!(
                                "ir_mode {ir:?} is not supported; substituted {replacement:?}"
                            ),
                        );
                        low_light.ir_mode = Some(replacement);
                    }
                }
            }
        }

        if let (Some(level), Some(levels)) =
            (low_light.noise_reduction, &caps.noise_reduction_levels)
        {
            if !levels.contains(&level) {
                if let Some(nearest) = nearest_u8(levels, level) {
                    push_warning(
                        &mut warnings,
                        "noise_reduction",
                        format!(
                            "noise_reduction {level} is not supported; substituted nearest supported {nearest}"
                        ),
                    );
                    low_light.noise_reduction = Some(nearest);
                }
            }
        }
    }

    warnings
}

fn push_warning(warnings: &mut Vec<String>, field: &str, message: String) {
    CLAMP_WARNINGS.with_label_values(&[field]).inc();
    warnings.push(message);
}

fn pixel_count(resolution: &str) -> Option<u64> {
    let (w, h) = resolution.split_once('x')?;
    Some(w.parse::<u64>().ok()? * h.parse::<u64>().ok()?)
}

fn nearest_resolution(supported: &[String], target: &str) -> Option<String> {
    let target_pixels = pixel_count(target)?;
    supported
        .iter()
        .filter_map(|r| pixel_count(r).map(|p| (r, p)))
        .min_by_key(|(_, p)| p.abs_diff(target_pixels))
        .map(|(r, _)| r.clone())
}

fn nearest_u8(supported: &[u8], target: u8) -> Option<u8> {
    supported
        .iter()
        .min_by_key(|v| v.abs_diff(target))
        .copied()
}

fn shutter_micros(shutter: &str) -> Option<u64> {
    let denom: u64 = shutter.strip_prefix("1/")?.parse().ok()?;
    (denom > 0).then(|| 1_000_000 / denom)
}

fn nearest_shutter(supported: &[String], target: &str) -> Option<String> {
    let target_micros = shutter_micros(target)?;
    supported
        .iter()
        .filter_map(|s| shutter_micros(s).map(|m| (s, m)))
        .min_by_key(|(_, m)| m.abs_diff(target_micros))
        .map(|(s, _)| s.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ExposureSettings, GainRange, StreamSettings, VideoCodec};

    fn constrained_caps() -> CameraCapabilities {
        CameraCapabilities {
            resolutions: Some(vec![
                "2560x1440".to_string(),
                "1920x1080".to_string(),
                "1280x720".to_string(),
            ]),
            codecs: Some(vec![VideoCodec::H264]),
            min_fps: Some(1),
            max_fps: Some(20),
            max_bitrate_mbps: Some(6.0),
            wdr_levels: Some(vec![0, 1, 2]),
            shutter_modes: None,
            gain_range_db: Some(GainRange {
                min_db: 0.0,
                max_db: 24.0,
            }),
            ir_modes: None,
            noise_reduction_levels: None,
            has_wdr: true,
            has_ir: true,
            has_blc: true,
            has_hlc: false,
            has_ptz: false,
            lpr_capable: false,
        }
    }

    #[test]
    fn bitrate_clamped_with_warning_naming_both_values() {
        let mut settings = CameraSettings {
            stream: Some(StreamSettings {
                bitrate_mbps: Some(9.0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let warnings = clamp_to_capabilities(&mut settings, &constrained_caps());

        assert_eq!(settings.stream.unwrap().bitrate_mbps, Some(6.0));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("bitrate"));
        assert!(warnings[0].contains('9'));
        assert!(warnings[0].contains('6'));
    }

    #[test]
    fn unsupported_resolution_replaced_by_nearest() {
        let mut settings = CameraSettings {
            stream: Some(StreamSettings {
                resolution: Some("3840x2160".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let warnings = clamp_to_capabilities(&mut settings, &constrained_caps());
        assert_eq!(
            settings.stream.unwrap().resolution,
            Some("2560x1440".to_string())
        );
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn hlc_dropped_when_feature_absent() {
        let mut settings = CameraSettings {
            exposure: Some(ExposureSettings {
                highlight_compensation: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        let warnings = clamp_to_capabilities(&mut settings, &constrained_caps());
        assert_eq!(
            settings.exposure.unwrap().highlight_compensation,
            Some(false)
        );
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn unconstrained_capabilities_produce_no_warnings() {
        let mut settings = CameraSettings {
            stream: Some(StreamSettings {
                resolution: Some("7680x4320".to_string()),
                fps: Some(120),
                bitrate_mbps: Some(50.0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let warnings =
            clamp_to_capabilities(&mut settings, &CameraCapabilities::unconstrained());
        assert!(warnings.is_empty());
        assert_eq!(settings.stream.unwrap().fps, Some(120));
    }

    #[test]
    fn gain_clamped_into_range() {
        let mut settings = CameraSettings {
            exposure: Some(ExposureSettings {
                gain_limit_db: Some(30.0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let warnings = clamp_to_capabilities(&mut settings, &constrained_caps());
        assert_eq!(settings.exposure.unwrap().gain_limit_db, Some(24.0));
        assert_eq!(warnings.len(), 1);
    }
}
