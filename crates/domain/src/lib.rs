pub mod error;
pub mod job;
pub mod options;
pub mod track;

pub use crate::error::{FailureKind, PipelineError};
pub use crate::job::{ArtifactReference, JobHandle, JobRequest, JobStatus, StatusReport};
pub use crate::options::{
    join_tokens, parse_option_list, verify_option_tables, Difficulty, Environment, Event, Mode,
    ModelTag, RemoteOption,
};
pub use crate::track::{sanitize_file_name, smart_filename, CoverArt, TrackMetadata};
