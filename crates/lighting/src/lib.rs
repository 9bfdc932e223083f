pub mod beatmap;
pub mod generator;

pub use beatmap::{Beatmap, LightEvent, Note, Obstacle};
pub use generator::{
    derive_events, difficulty_files, FileOutcome, LightingGenerator, LightingMode, LightingReport,
};
