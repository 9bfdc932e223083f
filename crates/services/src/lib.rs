pub mod archive;
pub mod client;
pub mod polling;
pub mod schema;
pub mod session;

pub use archive::{
    download_and_extract, extract_archive, is_already_generated, ExtractOutcome, ExtractionReport,
};
pub use client::{BeatSageClient, JobService, JobUpload};
pub use polling::{poll_until_terminal, PollAction, PollObservation, PollPolicy, PollSettings, PollState};
pub use schema::{FormFields, StatusTokens, WireSchema};
pub use session::{Session, DEFAULT_BASE_URL};
