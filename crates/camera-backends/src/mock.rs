use crate::adapter::{
    AdapterApplyOutcome, AdapterKind, CameraBackend, CameraHandle, DiscoveredCamera, ScanParams,
    SubGroupOutcome, VerifyTolerances,
};
use crate::translate;
use async_trait::async_trait;
use common::{AdapterError, CameraCapabilities, CameraSettings, SubGroup};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory backend for tests: behaves like a camera that supports a
/// configurable subset of sub-groups and remembers what was applied.
pub struct MockBackend {
    kind: AdapterKind,
    supported: HashSet<SubGroup>,
    fail_groups: HashSet<SubGroup>,
    fail_connect: bool,
    fail_verify: bool,
    /// Report bitrate as the device would after a kbps round trip.
    round_bitrate: bool,
    capabilities: CameraCapabilities,
    discovered: Vec<DiscoveredCamera>,
    state: Arc<RwLock<CameraSettings>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            kind: AdapterKind::Onvif,
            supported: SubGroup::ALL.into_iter().collect(),
            fail_groups: HashSet::new(),
            fail_connect: false,
            fail_verify: false,
            round_bitrate: false,
            capabilities: CameraCapabilities::unconstrained(),
            discovered: Vec::new(),
            state: Arc::new(RwLock::new(CameraSettings::default())),
        }
    }

    pub fn with_kind(mut self, kind: AdapterKind) -> Self {
        self.kind = kind;
        self
    }

    /// Restrict which sub-groups the fake device supports; the rest
    /// report `skipped_unsupported` on apply.
    pub fn with_supported_groups(mut self, groups: &[SubGroup]) -> Self {
        self.supported = groups.iter().copied().collect();
        self
    }

    pub fn with_group_failure(mut self, group: SubGroup) -> Self {
        self.fail_groups.insert(group);
        self
    }

    pub fn with_connect_failure(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn with_verify_failure(mut self) -> Self {
        self.fail_verify = true;
        self
    }

    pub fn with_bitrate_rounding(mut self) -> Self {
        self.round_bitrate = true;
        self
    }

    pub fn with_capabilities(mut self, capabilities: CameraCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_discovered(mut self, cameras: Vec<DiscoveredCamera>) -> Self {
        self.discovered = cameras;
        self
    }

    pub fn with_current_settings(mut self, settings: CameraSettings) -> Self {
        self.state = Arc::new(RwLock::new(settings));
        self
    }

    /// Settings as the fake device currently holds them.
    pub async fn stored_settings(&self) -> CameraSettings {
        self.state.read().await.clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraBackend for MockBackend {
    fn kind(&self) -> AdapterKind {
        self.kind
    }

    fn tolerances(&self) -> VerifyTolerances {
        VerifyTolerances {
            bitrate_mbps: 0.05,
            fps: 0,
        }
    }

    async fn connect(&self, handle: &CameraHandle) -> Result<(), AdapterError> {
        if self.fail_connect {
            return Err(AdapterError::Connect {
                target: handle.address.clone(),
                detail: "mock connect failure".to_string(),
            });
        }
        Ok(())
    }

    async fn discover(&self, params: &ScanParams) -> Result<Vec<DiscoveredCamera>, AdapterError> {
        Ok(self
            .discovered
            .iter()
            .take(params.max_results)
            .cloned()
            .collect())
    }

    async fn capabilities(
        &self,
        _handle: &CameraHandle,
    ) -> Result<CameraCapabilities, AdapterError> {
        Ok(self.capabilities.clone())
    }

    async fn current_settings(
        &self,
        _handle: &CameraHandle,
    ) -> Result<CameraSettings, AdapterError> {
        Ok(self.state.read().await.clone())
    }

    async fn apply_settings(
        &self,
        _handle: &CameraHandle,
        intended: &CameraSettings,
    ) -> Result<AdapterApplyOutcome, AdapterError> {
        let mut outcome = AdapterApplyOutcome::default();
        let mut state = self.state.write().await;

        for group in intended.present_groups() {
            if !self.supported.contains(&group) {
                outcome.record(group, SubGroupOutcome::SkippedUnsupported);
                continue;
            }
            if self.fail_groups.contains(&group) {
                outcome.record(
                    group,
                    SubGroupOutcome::Failed {
                        error: format!("mock failure applying {group}"),
                    },
                );
                continue;
            }

            debug!(group = %group, "mock applying sub-group");
            match group {
                SubGroup::Stream => {
                    let mut stream = intended.stream.clone();
                    if self.round_bitrate {
                        if let Some(s) = &mut stream {
                            s.bitrate_mbps = s
                                .bitrate_mbps
                                .map(|mbps| translate::kbps_to_mbps(translate::mbps_to_kbps(mbps)));
                        }
                    }
                    state.stream = stream;
                }
                SubGroup::Exposure => state.exposure = intended.exposure.clone(),
                SubGroup::LowLight => state.low_light = intended.low_light.clone(),
                SubGroup::Image => state.image = intended.image.clone(),
            }
            outcome.record(group, SubGroupOutcome::Applied);
        }

        Ok(outcome)
    }

    async fn verify_settings(
        &self,
        handle: &CameraHandle,
        _intended: &CameraSettings,
    ) -> Result<CameraSettings, AdapterError> {
        if self.fail_verify {
            return Err(AdapterError::Timeout(Duration::from_secs(5)));
        }
        self.current_settings(handle).await
    }
}
