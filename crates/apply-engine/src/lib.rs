pub mod engine;
pub mod job;
pub mod registry;
pub mod verify;

pub use engine::{ApplyEngine, ApplyEngineConfig};
pub use job::{ApplyJob, JobState, StepRecord, StepState};
pub use registry::{CameraLockTable, JobRegistry};
pub use verify::{SettingMismatch, VerificationResult};
