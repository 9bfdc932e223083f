pub mod runner;
pub mod summary;

pub use runner::{CompletedItem, Pipeline, PipelineOptions};
pub use summary::{ItemFailure, ItemOutcome, RunSummary};
