//! Pure unit conversions between canonical and wire representations.
//!
//! These must round-trip losslessly for every value inside a backend's
//! declared supported range: the verification engine compares values
//! that have been through one encode/decode cycle.

/// Canonical Mbps to the kbps integer most device wire formats use.
pub fn mbps_to_kbps(mbps: f64) -> u32 {
    (mbps * 1000.0).round() as u32
}

/// Wire kbps back to canonical Mbps.
pub fn kbps_to_mbps(kbps: u32) -> f64 {
    f64::from(kbps) / 1000.0
}

/// Canonical "1/N" shutter notation to exposure time in microseconds.
/// Returns `None` for anything that is not a plain reciprocal.
pub fn shutter_to_micros(shutter: &str) -> Option<u64> {
    let denom_str = shutter.strip_prefix("1/")?;
    let denom: u64 = denom_str.parse().ok()?;
    if denom == 0 {
        return None;
    }
    Some(1_000_000 / denom)
}

/// Exposure time in microseconds back to "1/N" notation. The reciprocal
/// is re-derived by rounding, which inverts `shutter_to_micros` for all
/// standard shutter denominators.
pub fn micros_to_shutter(micros: u64) -> Option<String> {
    if micros == 0 {
        return None;
    }
    let denom = (1_000_000.0 / micros as f64).round() as u64;
    if denom == 0 {
        return None;
    }
    Some(format!("1/{denom}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_round_trips_within_precision() {
        for mbps in [0.5, 1.0, 2.5, 4.096, 6.0, 8.192, 16.0] {
            let kbps = mbps_to_kbps(mbps);
            let back = kbps_to_mbps(kbps);
            assert!(
                (back - mbps).abs() < 0.0005,
                "{mbps} Mbps -> {kbps} kbps -> {back} Mbps"
            );
        }
    }

    #[test]
    fn shutter_round_trips_for_standard_speeds() {
        for denom in [1u64, 2, 4, 8, 15, 30, 50, 60, 100, 120, 250, 500, 1000, 2000, 10000] {
            let shutter = format!("1/{denom}");
            let micros = shutter_to_micros(&shutter).unwrap();
            assert_eq!(micros_to_shutter(micros).unwrap(), shutter);
        }
    }

    #[test]
    fn malformed_shutter_rejected() {
        assert!(shutter_to_micros("250").is_none());
        assert!(shutter_to_micros("1/0").is_none());
        assert!(shutter_to_micros("1/fast").is_none());
        assert!(micros_to_shutter(0).is_none());
    }
}
