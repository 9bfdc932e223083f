use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use autosage_domain::{ArtifactReference, JobHandle, JobStatus, PipelineError, StatusReport};

use crate::client::JobService;

/// Configurable polling limits; see [`PollSettings::policy_for`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub interval_secs: u64,
    pub base_timeout_secs: u64,
    /// Extra wait granted per second of input audio.
    pub timeout_per_audio_second: f64,
    pub max_timeout_secs: u64,
    pub max_consecutive_errors: u32,
    /// Limit for a single status request; the HTTP client's own timeout is
    /// sized for uploads.
    pub request_timeout_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: 3,
            base_timeout_secs: 180,
            timeout_per_audio_second: 1.0,
            max_timeout_secs: 900,
            max_consecutive_errors: 3,
            request_timeout_secs: 30,
        }
    }
}

impl PollSettings {
    /// Builds the policy for one job. Longer audio gets a later deadline.
    pub fn policy_for(&self, audio_secs: Option<f64>) -> PollPolicy {
        let extra = audio_secs
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(|secs| secs * self.timeout_per_audio_second.max(0.0))
            .unwrap_or(0.0);
        let deadline_secs = (self.base_timeout_secs as f64 + extra)
            .min(self.max_timeout_secs.max(self.base_timeout_secs) as f64);
        PollPolicy {
            interval: Duration::from_secs(self.interval_secs.max(1)),
            deadline: Duration::from_secs_f64(deadline_secs),
            max_consecutive_errors: self.max_consecutive_errors.max(1),
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub deadline: Duration,
    pub max_consecutive_errors: u32,
    pub request_timeout: Duration,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollState {
    pub attempts: u32,
    pub consecutive_errors: u32,
}

/// What one status request produced.
#[derive(Clone, Debug)]
pub enum PollObservation {
    Report(StatusReport),
    TransportError(String),
}

#[derive(Debug)]
pub enum PollAction {
    Wait(Duration),
    Succeed(ArtifactReference),
    Fail(PipelineError),
    TimedOut,
}

impl PollPolicy {
    /// Decides the next action from the latest observation. Pure: the caller
    /// owns the clock and the network.
    pub fn step(
        &self,
        elapsed: Duration,
        observation: PollObservation,
        state: PollState,
    ) -> (PollAction, PollState) {
        let mut next = PollState {
            attempts: state.attempts + 1,
            ..state
        };

        let action = match observation {
            PollObservation::Report(report) => {
                next.consecutive_errors = 0;
                match report.status {
                    JobStatus::Succeeded => match report.artifact() {
                        Some(artifact) => PollAction::Succeed(artifact),
                        None => PollAction::Fail(PipelineError::RemoteProcessing(
                            "job finished without a download reference".into(),
                        )),
                    },
                    JobStatus::Failed => PollAction::Fail(PipelineError::RemoteProcessing(
                        report
                            .message
                            .unwrap_or_else(|| "map generation failed".into()),
                    )),
                    JobStatus::Expired => PollAction::Fail(PipelineError::RemoteProcessing(
                        report.message.unwrap_or_else(|| "job expired".into()),
                    )),
                    JobStatus::Queued | JobStatus::Processing => self.wait_or_time_out(elapsed),
                }
            }
            PollObservation::TransportError(reason) => {
                next.consecutive_errors = state.consecutive_errors + 1;
                if next.consecutive_errors >= self.max_consecutive_errors {
                    PollAction::Fail(PipelineError::Network(format!(
                        "{reason} ({} consecutive failures)",
                        next.consecutive_errors
                    )))
                } else {
                    self.wait_or_time_out(elapsed)
                }
            }
        };
        (action, next)
    }

    fn wait_or_time_out(&self, elapsed: Duration) -> PollAction {
        if elapsed >= self.deadline {
            PollAction::TimedOut
        } else {
            PollAction::Wait(self.interval.min(self.deadline - elapsed))
        }
    }

    /// Time allowed for the next status request. Shrinks near the deadline
    /// so a hung request cannot push polling far past it.
    pub fn request_limit(&self, elapsed: Duration) -> Duration {
        self.request_timeout
            .min(self.deadline.saturating_sub(elapsed))
            .max(MIN_REQUEST_LIMIT)
    }
}

const MIN_REQUEST_LIMIT: Duration = Duration::from_secs(1);

/// Polls until the job reaches a terminal status, the deadline passes, or
/// too many status requests fail in a row.
pub async fn poll_until_terminal(
    service: &dyn JobService,
    handle: &JobHandle,
    policy: &PollPolicy,
) -> Result<ArtifactReference, PipelineError> {
    let started = Instant::now();
    let mut state = PollState::default();
    let mut last_status = None;

    loop {
        let limit = policy.request_limit(started.elapsed());
        let observation = match timeout(limit, service.poll(handle)).await {
            Err(_) => {
                warn!(job = %handle.id, ?limit, "status request timed out");
                PollObservation::TransportError(format!(
                    "status request timed out after {}s",
                    limit.as_secs()
                ))
            }
            Ok(Ok(report)) => {
                if last_status != Some(report.status) {
                    info!(job = %handle.id, status = ?report.status, "job status changed");
                    last_status = Some(report.status);
                }
                PollObservation::Report(report)
            }
            Ok(Err(err)) => {
                warn!(job = %handle.id, error = %err, "status request failed");
                PollObservation::TransportError(err.to_string())
            }
        };

        let elapsed = started.elapsed();
        let (action, next) = policy.step(elapsed, observation, state);
        state = next;

        match action {
            PollAction::Wait(delay) => {
                debug!(job = %handle.id, attempt = state.attempts, ?delay, "job still running");
                sleep(delay).await;
            }
            PollAction::Succeed(artifact) => return Ok(artifact),
            PollAction::Fail(err) => return Err(err),
            PollAction::TimedOut => {
                return Err(PipelineError::TimedOut {
                    job_id: handle.id.clone(),
                    waited_secs: elapsed.as_secs(),
                })
            }
        }
    }
}
