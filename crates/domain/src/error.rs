use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("failed to read metadata from {path:?}: {reason}")]
    MetadataRead { path: PathBuf, reason: String },
    #[error("submission failed{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Submission {
        status: Option<u16>,
        message: String,
    },
    #[error("remote processing failed: {0}")]
    RemoteProcessing(String),
    #[error("network error while polling: {0}")]
    Network(String),
    #[error("job {job_id} did not finish within {waited_secs}s")]
    TimedOut { job_id: String, waited_secs: u64 },
    #[error("download failed: {0}")]
    Download(String),
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),
    #[error("lighting generation failed for {path:?}: {reason}")]
    LightingGeneration { path: PathBuf, reason: String },
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn invalid_input<T: Into<String>>(message: T) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_options<T: Into<String>>(message: T) -> Self {
        Self::InvalidOptions(message.into())
    }

    pub fn configuration<T: Into<String>>(message: T) -> Self {
        Self::Configuration(message.into())
    }

    pub fn download<T: Into<String>>(message: T) -> Self {
        Self::Download(message.into())
    }

    pub fn corrupt_archive<T: Into<String>>(message: T) -> Self {
        Self::CorruptArchive(message.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidInput(_) => FailureKind::InvalidInput,
            Self::InvalidOptions(_) => FailureKind::InvalidOptions,
            Self::Configuration(_) => FailureKind::Configuration,
            Self::MetadataRead { .. } => FailureKind::MetadataRead,
            Self::Submission { .. } => FailureKind::Submission,
            Self::RemoteProcessing(_) => FailureKind::RemoteProcessing,
            Self::Network(_) => FailureKind::Network,
            Self::TimedOut { .. } => FailureKind::TimedOut,
            Self::Download(_) => FailureKind::Download,
            Self::CorruptArchive(_) => FailureKind::CorruptArchive,
            Self::LightingGeneration { .. } => FailureKind::LightingGeneration,
            Self::Io(_) => FailureKind::Filesystem,
        }
    }
}

/// Coarse classification used for logging and the run summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureKind {
    InvalidInput,
    InvalidOptions,
    Configuration,
    MetadataRead,
    Submission,
    RemoteProcessing,
    Network,
    TimedOut,
    Download,
    CorruptArchive,
    LightingGeneration,
    Filesystem,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::InvalidInput => "invalid input",
            FailureKind::InvalidOptions => "invalid options",
            FailureKind::Configuration => "configuration",
            FailureKind::MetadataRead => "metadata",
            FailureKind::Submission => "submission",
            FailureKind::RemoteProcessing => "remote processing",
            FailureKind::Network => "network",
            FailureKind::TimedOut => "timed out",
            FailureKind::Download => "download",
            FailureKind::CorruptArchive => "corrupt archive",
            FailureKind::LightingGeneration => "lighting",
            FailureKind::Filesystem => "filesystem",
        };
        f.write_str(label)
    }
}
