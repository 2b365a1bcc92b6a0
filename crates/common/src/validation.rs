//! Input size and shape limits for externally supplied values.

use crate::error::InputError;

/// Maximum length for resource IDs (camera_id, job_id, addresses).
pub const MAX_ID_LENGTH: usize = 256;

/// Maximum length for free-text notes passed to providers.
pub const MAX_NOTES_LENGTH: usize = 4096;

/// Maximum size of a base64-encoded scene image (~15 MB decoded).
pub const MAX_SCENE_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// Non-empty, bounded, no control characters.
pub fn ensure_id(field: &'static str, value: &str) -> Result<(), InputError> {
    if value.trim().is_empty() {
        return Err(InputError::MissingField(field));
    }
    if value.len() > MAX_ID_LENGTH {
        return Err(InputError::TooLong {
            field,
            len: value.len(),
            max: MAX_ID_LENGTH,
        });
    }
    if value.chars().any(char::is_control) {
        return Err(InputError::OutOfRange {
            field,
            detail: "contains control characters".to_string(),
        });
    }
    Ok(())
}

/// Bounded free text; empty is allowed.
pub fn ensure_text(field: &'static str, value: &str, max: usize) -> Result<(), InputError> {
    if value.len() > max {
        return Err(InputError::TooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_must_be_non_empty() {
        assert!(ensure_id("camera_id", "cam-1").is_ok());
        assert!(ensure_id("camera_id", "  ").is_err());
        assert!(ensure_id("camera_id", "").is_err());
    }

    #[test]
    fn ids_reject_control_characters() {
        assert!(ensure_id("camera_id", "cam\n1").is_err());
    }

    #[test]
    fn oversized_ids_rejected() {
        let long = "x".repeat(MAX_ID_LENGTH + 1);
        assert!(ensure_id("camera_id", &long).is_err());
    }

    #[test]
    fn text_limit_enforced() {
        assert!(ensure_text("notes", "short", 10).is_ok());
        assert!(ensure_text("notes", "this is too long", 10).is_err());
    }
}
