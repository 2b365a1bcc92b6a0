use crate::error::InputError;
use crate::validation::{ensure_id, ensure_text, MAX_NOTES_LENGTH, MAX_SCENE_IMAGE_BYTES};
use serde::{Deserialize, Serialize};

/// Deployment scene the camera watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneType {
    Entrance,
    Parking,
    Hallway,
    Perimeter,
    CashWrap,
    Lobby,
    Warehouse,
    Stairwell,
    LoadingDock,
}

impl SceneType {
    pub const ALL: [SceneType; 9] = [
        SceneType::Entrance,
        SceneType::Parking,
        SceneType::Hallway,
        SceneType::Perimeter,
        SceneType::CashWrap,
        SceneType::Lobby,
        SceneType::Warehouse,
        SceneType::Stairwell,
        SceneType::LoadingDock,
    ];
}

/// What the footage is primarily for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraPurpose {
    Facial,
    Plates,
    Overview,
    Evidence,
    Counting,
}

impl CameraPurpose {
    pub const ALL: [CameraPurpose; 5] = [
        CameraPurpose::Facial,
        CameraPurpose::Plates,
        CameraPurpose::Overview,
        CameraPurpose::Evidence,
        CameraPurpose::Counting,
    ];
}

/// Identity and classification of the camera under optimization.
/// Immutable for the duration of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraContext {
    pub camera_id: String,
    pub address: String,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub location: Option<String>,
    pub scene_type: SceneType,
    pub purpose: CameraPurpose,
}

impl CameraContext {
    pub fn validate(&self) -> Result<(), InputError> {
        ensure_id("camera_id", &self.camera_id)?;
        ensure_id("address", &self.address)?;
        Ok(())
    }
}

/// Caller-supplied constraints and hints for one optimization request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationContext {
    pub bandwidth_limit_mbps: Option<f64>,
    pub retention_days: Option<u32>,
    /// Base64-encoded still frame of the scene, if available.
    pub scene_image: Option<String>,
    pub notes: Option<String>,
}

impl OptimizationContext {
    pub fn validate(&self) -> Result<(), InputError> {
        if let Some(limit) = self.bandwidth_limit_mbps {
            if !limit.is_finite() || limit <= 0.0 || limit > 1000.0 {
                return Err(InputError::OutOfRange {
                    field: "bandwidth_limit_mbps",
                    detail: format!("{limit} not in (0, 1000]"),
                });
            }
        }
        if let Some(days) = self.retention_days {
            if days == 0 || days > 3650 {
                return Err(InputError::OutOfRange {
                    field: "retention_days",
                    detail: format!("{days} not in [1, 3650]"),
                });
            }
        }
        if let Some(image) = &self.scene_image {
            if image.len() > MAX_SCENE_IMAGE_BYTES {
                return Err(InputError::TooLong {
                    field: "scene_image",
                    len: image.len(),
                    max: MAX_SCENE_IMAGE_BYTES,
                });
            }
        }
        if let Some(notes) = &self.notes {
            ensure_text("notes", notes, MAX_NOTES_LENGTH)?;
        }
        Ok(())
    }
}
