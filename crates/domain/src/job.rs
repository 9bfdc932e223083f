use std::collections::BTreeSet;

use time::OffsetDateTime;

use crate::options::{Difficulty, Environment, Event, Mode, ModelTag, RemoteOption};
use crate::PipelineError;

/// Generation options attached to one input item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobRequest {
    pub difficulties: BTreeSet<Difficulty>,
    pub modes: BTreeSet<Mode>,
    pub events: BTreeSet<Event>,
    pub environment: Environment,
    pub model: ModelTag,
    /// The job needs the elevated limits of a Patreon session cookie.
    pub requires_patreon: bool,
}

impl JobRequest {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.difficulties.is_empty() {
            return Err(PipelineError::invalid_options(
                "at least one difficulty must be selected",
            ));
        }
        if self.modes.is_empty() {
            return Err(PipelineError::invalid_options(
                "at least one mode must be selected",
            ));
        }
        Ok(())
    }
}

impl Default for JobRequest {
    fn default() -> Self {
        Self {
            difficulties: Difficulty::ALL.iter().copied().collect(),
            modes: Mode::ALL.iter().copied().collect(),
            events: Event::ALL.iter().copied().collect(),
            environment: Environment::TheFirst,
            model: ModelTag::V2,
            requires_patreon: false,
        }
    }
}

/// Identifier of a submitted job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
    pub created_at: OffsetDateTime,
}

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
    Expired,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Expired
        )
    }
}

/// One decoded response of the status endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusReport {
    pub status: JobStatus,
    pub message: Option<String>,
    pub download_url: Option<String>,
}

impl StatusReport {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            message: None,
            download_url: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = Some(url.into());
        self
    }

    /// The artifact of a succeeded job that carries a download reference.
    pub fn artifact(&self) -> Option<ArtifactReference> {
        match (self.status, &self.download_url) {
            (JobStatus::Succeeded, Some(url)) => Some(ArtifactReference { url: url.clone() }),
            _ => None,
        }
    }
}

/// Location of the finished archive. Only obtainable from a succeeded report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactReference {
    url: String,
}

impl ArtifactReference {
    pub fn url(&self) -> &str {
        &self.url
    }
}
