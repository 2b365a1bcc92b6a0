use crate::verify::VerificationResult;
use camera_backends::{AdapterKind, CameraHandle};
use chrono::{DateTime, Utc};
use common::{CameraSettings, SubGroup};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const STEP_CONNECT: &str = "connect";
pub const STEP_SNAPSHOT: &str = "snapshot";
pub const STEP_VERIFY: &str = "verify";

/// Step name for applying one sub-group, e.g. "apply_stream".
pub fn apply_step_name(group: SubGroup) -> String {
    format!("apply_{}", group.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    InProgress,
    Verifying,
    Completed,
    Partial,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Partial | JobState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::InProgress => "in_progress",
            JobState::Verifying => "verifying",
            JobState::Completed => "completed",
            JobState::Partial => "partial",
            JobState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub state: StepState,
    pub error: Option<String>,
}

impl StepRecord {
    fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: StepState::Pending,
            error: None,
        }
    }
}

/// One apply request, tracked from creation to a terminal state.
/// State transitions happen only inside the apply engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyJob {
    pub job_id: String,
    pub camera_id: String,
    pub handle: CameraHandle,
    pub intended: CameraSettings,
    pub adapter_kind: AdapterKind,
    pub verify_requested: bool,
    pub state: JobState,
    pub steps: Vec<StepRecord>,
    /// Settings read before any apply, for operator reference.
    pub snapshot: Option<CameraSettings>,
    pub verification: Option<VerificationResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ApplyJob {
    pub fn new(
        camera_id: impl Into<String>,
        handle: CameraHandle,
        intended: CameraSettings,
        adapter_kind: AdapterKind,
        verify_requested: bool,
    ) -> Self {
        let mut steps = vec![
            StepRecord::pending(STEP_CONNECT),
            StepRecord::pending(STEP_SNAPSHOT),
        ];
        for group in SubGroup::ALL {
            steps.push(StepRecord::pending(apply_step_name(group)));
        }
        if verify_requested {
            steps.push(StepRecord::pending(STEP_VERIFY));
        }

        Self {
            job_id: Uuid::new_v4().to_string(),
            camera_id: camera_id.into(),
            handle,
            intended,
            adapter_kind,
            verify_requested,
            state: JobState::Pending,
            steps,
            snapshot: None,
            verification: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub(crate) fn step_mut(&mut self, name: &str) -> Option<&mut StepRecord> {
        self.steps.iter_mut().find(|s| s.name == name)
    }

    pub(crate) fn set_step(&mut self, name: &str, state: StepState, error: Option<String>) {
        if let Some(step) = self.step_mut(name) {
            step.state = state;
            step.error = error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(verify: bool) -> ApplyJob {
        ApplyJob::new(
            "cam-1",
            CameraHandle::new("192.168.1.9"),
            CameraSettings::default(),
            AdapterKind::Onvif,
            verify,
        )
    }

    #[test]
    fn new_job_is_pending_with_ordered_steps() {
        let job = job(true);
        assert_eq!(job.state, JobState::Pending);
        let names: Vec<&str> = job.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "connect",
                "snapshot",
                "apply_stream",
                "apply_exposure",
                "apply_low_light",
                "apply_image",
                "verify"
            ]
        );
        assert!(job.steps.iter().all(|s| s.state == StepState::Pending));
    }

    #[test]
    fn verify_step_omitted_when_not_requested() {
        let job = job(false);
        assert!(job.step(STEP_VERIFY).is_none());
        assert_eq!(job.steps.len(), 6);
    }

    #[test]
    fn terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Partial.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::InProgress.is_terminal());
        assert!(!JobState::Verifying.is_terminal());
    }

    #[test]
    fn set_step_updates_in_place() {
        let mut job = job(false);
        job.set_step(STEP_CONNECT, StepState::Failed, Some("refused".to_string()));
        let step = job.step(STEP_CONNECT).unwrap();
        assert_eq!(step.state, StepState::Failed);
        assert_eq!(step.error.as_deref(), Some("refused"));
    }
}
