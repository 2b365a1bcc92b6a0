use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AdapterError, CameraCapabilities, CameraSettings, SubGroup};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Which backend speaks to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    /// Direct device protocol: WS-Discovery + SOAP to the camera itself.
    Onvif,
    /// Video management system REST API; the VMS mediates device access.
    Vms,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::Onvif => "onvif",
            AdapterKind::Vms => "vms",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
}

/// Addressing information for one camera.
///
/// `vms_id` is the VMS-internal identifier; the VMS backend requires it,
/// the direct backend ignores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraHandle {
    pub address: String,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub vms_id: Option<String>,
}

impl CameraHandle {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            credentials: None,
            vms_id: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_vms_id(mut self, id: impl Into<String>) -> Self {
        self.vms_id = Some(id.into());
        self
    }
}

/// Parameters for a discovery scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanParams {
    pub timeout_secs: u64,
    pub max_results: usize,
    /// Page size for inventory-listing backends; ignored by probes.
    pub page_size: usize,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            max_results: 100,
            page_size: 50,
        }
    }
}

/// A camera found by a discovery scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredCamera {
    pub address: String,
    pub name: Option<String>,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub hardware_id: Option<String>,
    pub source: AdapterKind,
    pub vms_id: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

/// Per-sub-group result of an apply call. A sub-group is written
/// atomically or not at all; there is no partial-group state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubGroupOutcome {
    Applied,
    SkippedUnsupported,
    Failed { error: String },
}

impl SubGroupOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, SubGroupOutcome::Applied)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterApplyOutcome {
    pub outcomes: HashMap<SubGroup, SubGroupOutcome>,
}

impl AdapterApplyOutcome {
    pub fn record(&mut self, group: SubGroup, outcome: SubGroupOutcome) {
        self.outcomes.insert(group, outcome);
    }

    pub fn outcome_for(&self, group: SubGroup) -> Option<&SubGroupOutcome> {
        self.outcomes.get(&group)
    }
}

/// Numeric slack for post-apply verification, declared per backend.
/// Devices and VMSes round reported values; exact comparison would
/// produce false mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerifyTolerances {
    pub bitrate_mbps: f64,
    pub fps: u32,
}

impl Default for VerifyTolerances {
    fn default() -> Self {
        Self {
            bitrate_mbps: 0.0,
            fps: 0,
        }
    }
}

/// Backend adapter contract, implemented identically by the direct
/// ONVIF backend and the VMS backend. All operations are one-shot
/// network exchanges bounded by the backend's configured timeout.
#[async_trait]
pub trait CameraBackend: Send + Sync {
    fn kind(&self) -> AdapterKind;

    fn tolerances(&self) -> VerifyTolerances {
        VerifyTolerances::default()
    }

    /// Cheap reachability/credential check used as the first job step.
    async fn connect(&self, handle: &CameraHandle) -> Result<(), AdapterError>;

    /// Finite scan bounded by `params.timeout_secs`; partial results
    /// collected before the deadline are returned, not discarded.
    async fn discover(&self, params: &ScanParams) -> Result<Vec<DiscoveredCamera>, AdapterError>;

    async fn capabilities(&self, handle: &CameraHandle)
        -> Result<CameraCapabilities, AdapterError>;

    /// May return settings with sub-groups left `None` when the backend
    /// cannot expose them.
    async fn current_settings(&self, handle: &CameraHandle)
        -> Result<CameraSettings, AdapterError>;

    /// Applies every sub-group present in `intended` that the backend
    /// supports and reports a per-group outcome.
    async fn apply_settings(
        &self,
        handle: &CameraHandle,
        intended: &CameraSettings,
    ) -> Result<AdapterApplyOutcome, AdapterError>;

    /// Re-reads current state for verification. Comparison is the
    /// verification engine's job, not the adapter's.
    async fn verify_settings(
        &self,
        handle: &CameraHandle,
        _intended: &CameraSettings,
    ) -> Result<CameraSettings, AdapterError> {
        self.current_settings(handle).await
    }
}
