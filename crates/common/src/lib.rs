pub mod capabilities;
pub mod context;
pub mod error;
pub mod recommendation;
pub mod settings;
pub mod validation;

pub use capabilities::{CameraCapabilities, GainRange};
pub use context::{CameraContext, CameraPurpose, OptimizationContext, SceneType};
pub use error::{AdapterError, EngineError, InputError, OptimizeError, ProviderError};
pub use recommendation::OptimizationResult;
pub use settings::{
    BitrateMode, CameraSettings, DayNightMode, ExposureMode, ExposureSettings, ImageSettings,
    IrMode, LowLightSettings, StreamSettings, SubGroup, VideoCodec, WhiteBalanceMode,
};
