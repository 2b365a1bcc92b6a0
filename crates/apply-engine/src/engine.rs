use crate::job::{
    apply_step_name, ApplyJob, JobState, StepState, STEP_CONNECT, STEP_SNAPSHOT, STEP_VERIFY,
};
use crate::registry::{CameraLockTable, JobRegistry};
use crate::verify::{self, VerificationResult};
use camera_backends::{AdapterKind, CameraBackend, CameraHandle, SubGroupOutcome};
use chrono::Utc;
use common::{validation, AdapterError, CameraSettings, EngineError, InputError, SubGroup};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::metrics::{ACTIVE_APPLY_JOBS, APPLY_JOBS, APPLY_JOB_DURATION};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

// connect + snapshot + four sub-group applies + verify
const STEP_COUNT: u32 = 7;

#[derive(Debug, Clone)]
pub struct ApplyEngineConfig {
    /// Budget for each individual adapter call.
    pub step_timeout_secs: u64,
}

impl Default for ApplyEngineConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: 15,
        }
    }
}

/// Sequences adapter calls for one camera at a time and tracks job
/// state. Owns the only shared mutable state in the pipeline: the job
/// registry and the per-camera lock table, both dependency-injected so
/// tests can run isolated engines side by side.
pub struct ApplyEngine {
    backends: HashMap<AdapterKind, Arc<dyn CameraBackend>>,
    registry: Arc<JobRegistry>,
    locks: Arc<CameraLockTable>,
    step_timeout: Duration,
}

impl ApplyEngine {
    pub fn new(config: ApplyEngineConfig) -> Self {
        Self {
            backends: HashMap::new(),
            registry: Arc::new(JobRegistry::new()),
            locks: Arc::new(CameraLockTable::new()),
            step_timeout: Duration::from_secs(config.step_timeout_secs),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn CameraBackend>) -> Self {
        self.backends.insert(backend.kind(), backend);
        self
    }

    pub fn backend(&self, kind: AdapterKind) -> Result<Arc<dyn CameraBackend>, EngineError> {
        self.backends
            .get(&kind)
            .cloned()
            .ok_or_else(|| EngineError::UnknownBackend(kind.to_string()))
    }

    /// Create and launch a job. Rejects immediately with `Busy` when the
    /// camera already has an active job; never queues.
    pub async fn start_job(
        &self,
        camera_id: &str,
        handle: CameraHandle,
        intended: CameraSettings,
        adapter_kind: AdapterKind,
        verify_requested: bool,
    ) -> Result<String, EngineError> {
        validation::ensure_id("camera_id", camera_id)?;
        for group in SubGroup::ALL {
            if !intended.has_group(group) {
                return Err(InputError::MissingField(match group {
                    SubGroup::Stream => "settings.stream",
                    SubGroup::Exposure => "settings.exposure",
                    SubGroup::LowLight => "settings.low_light",
                    SubGroup::Image => "settings.image",
                })
                .into());
            }
        }

        let backend = self.backend(adapter_kind)?;

        let guard = self
            .locks
            .try_acquire(camera_id)
            .await
            .ok_or_else(|| EngineError::Busy {
                camera_id: camera_id.to_string(),
            })?;

        let job = ApplyJob::new(camera_id, handle, intended, adapter_kind, verify_requested);
        let job_id = job.job_id.clone();
        let slot = self.registry.insert(job).await;
        ACTIVE_APPLY_JOBS.inc();

        info!(
            job_id = %job_id,
            camera_id = %camera_id,
            adapter = %adapter_kind,
            verify = verify_requested,
            "apply job started"
        );

        let step_timeout = self.step_timeout;
        let task_job_id = job_id.clone();
        tokio::spawn(async move {
            // Held for the whole run; dropping it releases the camera.
            let _guard = guard;
            let budget = step_timeout * STEP_COUNT;

            let run = Self::run_job(Arc::clone(&slot), backend, step_timeout);
            if tokio::time::timeout(budget, run).await.is_err() {
                error!(job_id = %task_job_id, "job exceeded total time budget");
                let mut job = slot.write().await;
                job.state = JobState::Failed;
                job.error = Some(format!("job exceeded time budget of {budget:?}"));
                job.completed_at = Some(Utc::now());
                finish_metrics(&job);
            }
        });

        Ok(job_id)
    }

    /// Read-only snapshot of a job.
    pub async fn job_status(&self, job_id: &str) -> Result<ApplyJob, EngineError> {
        self.registry
            .snapshot(job_id)
            .await
            .ok_or_else(|| EngineError::NotFound(job_id.to_string()))
    }

    pub async fn list_jobs(&self) -> Vec<ApplyJob> {
        self.registry.list().await
    }

    async fn run_job(
        slot: Arc<RwLock<ApplyJob>>,
        backend: Arc<dyn CameraBackend>,
        step_timeout: Duration,
    ) {
        let started = Instant::now();
        let (job_id, handle, intended, verify_requested, adapter_kind) = {
            let mut job = slot.write().await;
            job.state = JobState::InProgress;
            job.started_at = Some(Utc::now());
            (
                job.job_id.clone(),
                job.handle.clone(),
                job.intended.clone(),
                job.verify_requested,
                job.adapter_kind,
            )
        };

        // Step 1: connect. Failure aborts the whole job; nothing else is
        // attempted.
        set_step(&slot, STEP_CONNECT, StepState::InProgress, None).await;
        let connect = bounded(step_timeout, backend.connect(&handle)).await;
        if let Err(e) = connect {
            warn!(job_id = %job_id, error = %e, "connect failed, aborting job");
            set_step(&slot, STEP_CONNECT, StepState::Failed, Some(e.to_string())).await;
            let mut job = slot.write().await;
            for group in SubGroup::ALL {
                job.set_step(&apply_step_name(group), StepState::Skipped, None);
            }
            job.set_step(STEP_SNAPSHOT, StepState::Skipped, None);
            if verify_requested {
                job.set_step(STEP_VERIFY, StepState::Skipped, None);
            }
            job.state = JobState::Failed;
            job.error = Some(format!("connect failed: {e}"));
            job.completed_at = Some(Utc::now());
            finish_metrics(&job);
            APPLY_JOB_DURATION
                .with_label_values(&[adapter_kind.as_str()])
                .observe(started.elapsed().as_secs_f64());
            return;
        }
        set_step(&slot, STEP_CONNECT, StepState::Completed, None).await;

        // Step 2: snapshot current settings. Informational; a failure is
        // recorded but does not stop the applies.
        set_step(&slot, STEP_SNAPSHOT, StepState::InProgress, None).await;
        match bounded(step_timeout, backend.current_settings(&handle)).await {
            Ok(current) => {
                let mut job = slot.write().await;
                job.snapshot = Some(current);
                job.set_step(STEP_SNAPSHOT, StepState::Completed, None);
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "snapshot of current settings failed");
                set_step(&slot, STEP_SNAPSHOT, StepState::Failed, Some(e.to_string())).await;
            }
        }

        // Steps 3-6: apply each sub-group in fixed order. Sub-groups are
        // independent; one failing does not stop the rest.
        let mut outcomes: HashMap<SubGroup, SubGroupOutcome> = HashMap::new();
        for group in SubGroup::ALL {
            let step_name = apply_step_name(group);
            set_step(&slot, &step_name, StepState::InProgress, None).await;

            let only = intended.only(group);
            let outcome = match bounded(step_timeout, backend.apply_settings(&handle, &only)).await
            {
                Ok(applied) => applied
                    .outcome_for(group)
                    .cloned()
                    .unwrap_or(SubGroupOutcome::SkippedUnsupported),
                Err(AdapterError::Unsupported { what }) => {
                    warn!(job_id = %job_id, group = %group, what = %what, "sub-group unsupported");
                    SubGroupOutcome::SkippedUnsupported
                }
                Err(e) => SubGroupOutcome::Failed {
                    error: e.to_string(),
                },
            };

            let (state, step_error) = match &outcome {
                SubGroupOutcome::Applied => (StepState::Completed, None),
                SubGroupOutcome::SkippedUnsupported => (StepState::Skipped, None),
                SubGroupOutcome::Failed { error } => (StepState::Failed, Some(error.clone())),
            };
            set_step(&slot, &step_name, state, step_error).await;
            outcomes.insert(group, outcome);
        }

        let applied: Vec<SubGroup> = SubGroup::ALL
            .into_iter()
            .filter(|g| outcomes.get(g).is_some_and(SubGroupOutcome::is_applied))
            .collect();
        let any_failed = outcomes
            .values()
            .any(|o| matches!(o, SubGroupOutcome::Failed { .. }));
        let any_skipped = outcomes
            .values()
            .any(|o| matches!(o, SubGroupOutcome::SkippedUnsupported));

        // Step 7: verification, only when requested and something was
        // actually written. A failed re-read leaves verification marked
        // unavailable; the terminal state still follows apply outcomes.
        let verification: Option<VerificationResult> = if verify_requested && !applied.is_empty() {
            {
                let mut job = slot.write().await;
                job.state = JobState::Verifying;
            }
            set_step(&slot, STEP_VERIFY, StepState::InProgress, None).await;
            match bounded(step_timeout, backend.verify_settings(&handle, &intended)).await {
                Ok(actual) => {
                    let result =
                        verify::compare(&intended, &actual, &applied, &backend.tolerances());
                    set_step(&slot, STEP_VERIFY, StepState::Completed, None).await;
                    Some(result)
                }
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "verification re-read failed");
                    set_step(&slot, STEP_VERIFY, StepState::Failed, Some(e.to_string())).await;
                    Some(VerificationResult::unavailable(e.to_string()))
                }
            }
        } else {
            if verify_requested {
                set_step(&slot, STEP_VERIFY, StepState::Skipped, None).await;
            }
            None
        };

        let mismatch_count = verification
            .as_ref()
            .map(|v| v.mismatches.len())
            .unwrap_or(0);

        let (state, job_error) = if applied.is_empty() {
            let message = if any_failed {
                "every sub-group failed to apply"
            } else {
                "no sub-group supported by the backend"
            };
            (JobState::Failed, Some(message.to_string()))
        } else if any_failed || any_skipped || mismatch_count > 0 {
            (JobState::Partial, None)
        } else {
            (JobState::Completed, None)
        };

        let mut job = slot.write().await;
        job.verification = verification;
        job.state = state;
        job.error = job_error;
        job.completed_at = Some(Utc::now());
        finish_metrics(&job);
        APPLY_JOB_DURATION
            .with_label_values(&[adapter_kind.as_str()])
            .observe(started.elapsed().as_secs_f64());

        info!(
            job_id = %job_id,
            state = job.state.as_str(),
            applied = applied.len(),
            mismatches = mismatch_count,
            "apply job finished"
        );
    }
}

/// A timed-out call is a failure of that call, never
/// success-with-unknown-state.
async fn bounded<T>(
    step_timeout: Duration,
    fut: impl std::future::Future<Output = Result<T, AdapterError>>,
) -> Result<T, AdapterError> {
    match tokio::time::timeout(step_timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(AdapterError::Timeout(step_timeout)),
    }
}

async fn set_step(
    slot: &Arc<RwLock<ApplyJob>>,
    name: &str,
    state: StepState,
    error: Option<String>,
) {
    let mut job = slot.write().await;
    job.set_step(name, state, error);
}

fn finish_metrics(job: &ApplyJob) {
    ACTIVE_APPLY_JOBS.dec();
    APPLY_JOBS.with_label_values(&[job.state.as_str()]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use camera_backends::{AdapterApplyOutcome, DiscoveredCamera, MockBackend, ScanParams};
    use common::{
        CameraCapabilities, ExposureSettings, ImageSettings, LowLightSettings, StreamSettings,
    };

    fn full_intended() -> CameraSettings {
        CameraSettings {
            stream: Some(StreamSettings {
                resolution: Some("1920x1080".to_string()),
                fps: Some(15),
                bitrate_mbps: Some(4.0),
                ..Default::default()
            }),
            exposure: Some(ExposureSettings {
                wdr_level: Some(2),
                ..Default::default()
            }),
            low_light: Some(LowLightSettings {
                noise_reduction: Some(2),
                ..Default::default()
            }),
            image: Some(ImageSettings {
                brightness: Some(50),
                ..Default::default()
            }),
        }
    }

    async fn wait_terminal(engine: &ApplyEngine, job_id: &str) -> ApplyJob {
        for _ in 0..200 {
            let job = engine.job_status(job_id).await.unwrap();
            if job.state.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} did not reach a terminal state");
    }

    fn engine_with(backend: Arc<dyn CameraBackend>) -> ApplyEngine {
        ApplyEngine::new(ApplyEngineConfig::default()).with_backend(backend)
    }

    #[tokio::test]
    async fn happy_path_completes_with_clean_verification() {
        let engine = engine_with(Arc::new(MockBackend::new()));
        let job_id = engine
            .start_job(
                "cam-1",
                CameraHandle::new("mock"),
                full_intended(),
                AdapterKind::Onvif,
                true,
            )
            .await
            .unwrap();

        let job = wait_terminal(&engine, &job_id).await;
        assert_eq!(job.state, JobState::Completed);
        let verification = job.verification.unwrap();
        assert!(verification.verified);
        assert!(verification.mismatches.is_empty());
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn connect_failure_fails_job_with_no_group_attempted() {
        let engine = engine_with(Arc::new(MockBackend::new().with_connect_failure()));
        let job_id = engine
            .start_job(
                "cam-1",
                CameraHandle::new("mock"),
                full_intended(),
                AdapterKind::Onvif,
                true,
            )
            .await
            .unwrap();

        let job = wait_terminal(&engine, &job_id).await;
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.step(STEP_CONNECT).unwrap().state, StepState::Failed);
        for group in SubGroup::ALL {
            assert_eq!(
                job.step(&apply_step_name(group)).unwrap().state,
                StepState::Skipped,
                "{group} should never have been attempted"
            );
        }
        assert!(job.verification.is_none());
        assert!(job.error.as_deref().unwrap().contains("connect"));
    }

    #[tokio::test]
    async fn stream_only_camera_ends_partial_with_empty_mismatches() {
        // The §8 scenario: only stream supported, all four intended,
        // verify on.
        let backend = Arc::new(MockBackend::new().with_supported_groups(&[SubGroup::Stream]));
        let engine = engine_with(backend);
        let job_id = engine
            .start_job(
                "cam-1",
                CameraHandle::new("mock"),
                full_intended(),
                AdapterKind::Onvif,
                true,
            )
            .await
            .unwrap();

        let job = wait_terminal(&engine, &job_id).await;
        assert_eq!(job.state, JobState::Partial);
        assert_eq!(
            job.step(&apply_step_name(SubGroup::Stream)).unwrap().state,
            StepState::Completed
        );
        for group in [SubGroup::Exposure, SubGroup::LowLight, SubGroup::Image] {
            assert_eq!(
                job.step(&apply_step_name(group)).unwrap().state,
                StepState::Skipped
            );
        }
        let verification = job.verification.unwrap();
        assert!(verification.mismatches.is_empty());
        assert!(verification.verified);
    }

    #[tokio::test]
    async fn group_failure_does_not_halt_later_groups() {
        let backend = Arc::new(MockBackend::new().with_group_failure(SubGroup::Exposure));
        let engine = engine_with(backend);
        let job_id = engine
            .start_job(
                "cam-1",
                CameraHandle::new("mock"),
                full_intended(),
                AdapterKind::Onvif,
                false,
            )
            .await
            .unwrap();

        let job = wait_terminal(&engine, &job_id).await;
        assert_eq!(job.state, JobState::Partial);
        assert_eq!(
            job.step(&apply_step_name(SubGroup::Exposure)).unwrap().state,
            StepState::Failed
        );
        // later groups still ran
        assert_eq!(
            job.step(&apply_step_name(SubGroup::Image)).unwrap().state,
            StepState::Completed
        );
    }

    #[tokio::test]
    async fn all_groups_failing_fails_the_job() {
        let backend = Arc::new(
            MockBackend::new()
                .with_group_failure(SubGroup::Stream)
                .with_group_failure(SubGroup::Exposure)
                .with_group_failure(SubGroup::LowLight)
                .with_group_failure(SubGroup::Image),
        );
        let engine = engine_with(backend);
        let job_id = engine
            .start_job(
                "cam-1",
                CameraHandle::new("mock"),
                full_intended(),
                AdapterKind::Onvif,
                false,
            )
            .await
            .unwrap();

        let job = wait_terminal(&engine, &job_id).await;
        assert_eq!(job.state, JobState::Failed);
        assert!(job.error.as_deref().unwrap().contains("failed"));
    }

    #[tokio::test]
    async fn verification_re_read_failure_leaves_job_state_to_apply_outcomes() {
        let backend = Arc::new(MockBackend::new().with_verify_failure());
        let engine = engine_with(backend);
        let job_id = engine
            .start_job(
                "cam-1",
                CameraHandle::new("mock"),
                full_intended(),
                AdapterKind::Onvif,
                true,
            )
            .await
            .unwrap();

        let job = wait_terminal(&engine, &job_id).await;
        // all groups applied; unavailable verification must not fail it
        assert_eq!(job.state, JobState::Completed);
        let verification = job.verification.unwrap();
        assert!(verification.error.is_some());
        assert!(!verification.verified);
        assert_eq!(job.step(STEP_VERIFY).unwrap().state, StepState::Failed);
    }

    #[tokio::test]
    async fn partial_intent_rejected_as_input_error() {
        let engine = engine_with(Arc::new(MockBackend::new()));
        let partial = CameraSettings {
            stream: Some(Default::default()),
            ..Default::default()
        };
        let err = engine
            .start_job(
                "cam-1",
                CameraHandle::new("mock"),
                partial,
                AdapterKind::Onvif,
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Input(_)));
    }

    #[tokio::test]
    async fn unknown_backend_rejected() {
        let engine = engine_with(Arc::new(MockBackend::new())); // registers Onvif
        let err = engine
            .start_job(
                "cam-1",
                CameraHandle::new("mock"),
                full_intended(),
                AdapterKind::Vms,
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownBackend(_)));
    }

    /// Backend that holds the connect step open long enough to observe
    /// concurrency behavior.
    struct SlowBackend {
        delay: Duration,
    }

    #[async_trait]
    impl CameraBackend for SlowBackend {
        fn kind(&self) -> AdapterKind {
            AdapterKind::Onvif
        }

        async fn connect(&self, _handle: &CameraHandle) -> Result<(), AdapterError> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        async fn discover(
            &self,
            _params: &ScanParams,
        ) -> Result<Vec<DiscoveredCamera>, AdapterError> {
            Ok(Vec::new())
        }

        async fn capabilities(
            &self,
            _handle: &CameraHandle,
        ) -> Result<CameraCapabilities, AdapterError> {
            Ok(CameraCapabilities::unconstrained())
        }

        async fn current_settings(
            &self,
            _handle: &CameraHandle,
        ) -> Result<CameraSettings, AdapterError> {
            Ok(CameraSettings::default())
        }

        async fn apply_settings(
            &self,
            _handle: &CameraHandle,
            intended: &CameraSettings,
        ) -> Result<AdapterApplyOutcome, AdapterError> {
            let mut outcome = AdapterApplyOutcome::default();
            for group in intended.present_groups() {
                outcome.record(group, SubGroupOutcome::Applied);
            }
            Ok(outcome)
        }
    }

    #[tokio::test]
    async fn second_job_for_same_camera_is_busy() {
        let engine = engine_with(Arc::new(SlowBackend {
            delay: Duration::from_millis(300),
        }));

        let first = engine
            .start_job(
                "cam-1",
                CameraHandle::new("mock"),
                full_intended(),
                AdapterKind::Onvif,
                false,
            )
            .await
            .unwrap();

        let err = engine
            .start_job(
                "cam-1",
                CameraHandle::new("mock"),
                full_intended(),
                AdapterKind::Onvif,
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Busy { .. }));

        // a different camera is unaffected
        engine
            .start_job(
                "cam-2",
                CameraHandle::new("mock"),
                full_intended(),
                AdapterKind::Onvif,
                false,
            )
            .await
            .unwrap();

        // once the first job is done the camera frees up
        wait_terminal(&engine, &first).await;
        engine
            .start_job(
                "cam-1",
                CameraHandle::new("mock"),
                full_intended(),
                AdapterKind::Onvif,
                false,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn concurrent_starts_admit_exactly_one_job() {
        let engine = Arc::new(engine_with(Arc::new(SlowBackend {
            delay: Duration::from_millis(300),
        })));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine
                    .start_job(
                        "cam-race",
                        CameraHandle::new("mock"),
                        full_intended(),
                        AdapterKind::Onvif,
                        false,
                    )
                    .await
            }));
        }

        let mut admitted = 0;
        let mut busy = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(EngineError::Busy { .. }) => busy += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(busy, 7);
    }
}
