pub mod adapter;
pub mod mock;
pub mod onvif;
pub mod translate;
pub mod vms;

pub use adapter::{
    AdapterApplyOutcome, AdapterKind, CameraBackend, CameraHandle, Credentials, DiscoveredCamera,
    ScanParams, SubGroupOutcome, VerifyTolerances,
};
pub use mock::MockBackend;
pub use onvif::OnvifBackend;
pub use vms::VmsBackend;
