use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use autosage_domain::PipelineError;

use crate::beatmap::{Beatmap, LightEvent, Note, RED_NOTE};

/// Light types cycled through by successive note groups: back lasers,
/// ring lights, left lasers, right lasers, centre lights.
const LIGHT_TYPES: [u8; 5] = [0, 1, 2, 3, 4];
const RING_SPIN: u8 = 8;
const RING_ZOOM: u8 = 9;
const RING_EVERY: usize = 4;

const BLUE_ON: u8 = 1;
const BLUE_FLASH: u8 = 2;
const RED_ON: u8 = 5;
const RED_FLASH: u8 = 6;

/// Notes closer than this (in beats) share one lighting cue.
const GROUP_EPSILON: f64 = 1e-3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightingMode {
    /// Only files without any events are written.
    #[default]
    Fill,
    /// Existing events are discarded and regenerated.
    Replace,
}

impl FromStr for LightingMode {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fill" => Ok(Self::Fill),
            "replace" => Ok(Self::Replace),
            other => Err(PipelineError::configuration(format!(
                "unknown lighting mode '{other}' (expected fill or replace)"
            ))),
        }
    }
}

impl fmt::Display for LightingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fill => "fill",
            Self::Replace => "replace",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileOutcome {
    Written { events: usize },
    Kept,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LightingReport {
    pub written: usize,
    pub kept: usize,
    pub failed: usize,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LightingGenerator {
    mode: LightingMode,
}

impl LightingGenerator {
    pub fn new(mode: LightingMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> LightingMode {
        self.mode
    }

    /// Processes every difficulty file in an extracted level. Malformed
    /// files are logged and skipped.
    pub fn process_level(&self, level_dir: &Path) -> LightingReport {
        let mut report = LightingReport::default();
        let files = match difficulty_files(level_dir) {
            Ok(files) => files,
            Err(err) => {
                warn!(dir = %level_dir.display(), error = %err, "cannot list level files");
                return report;
            }
        };
        for path in files {
            match self.process_file(&path) {
                Ok(FileOutcome::Written { events }) => {
                    debug!(file = %path.display(), events, "lighting written");
                    report.written += 1;
                }
                Ok(FileOutcome::Kept) => report.kept += 1,
                Err(err) => {
                    warn!(error = %err, "skipping lighting for file");
                    report.failed += 1;
                }
            }
        }
        info!(
            dir = %level_dir.display(),
            mode = %self.mode,
            written = report.written,
            kept = report.kept,
            failed = report.failed,
            "lighting pass finished"
        );
        report
    }

    pub fn process_file(&self, path: &Path) -> Result<FileOutcome, PipelineError> {
        let failure = |reason: String| PipelineError::LightingGeneration {
            path: path.to_path_buf(),
            reason,
        };
        let raw = fs::read(path).map_err(|err| failure(err.to_string()))?;
        let mut beatmap = Beatmap::parse(&raw).map_err(failure)?;

        if self.mode == LightingMode::Fill && !beatmap.events.is_empty() {
            return Ok(FileOutcome::Kept);
        }
        beatmap.events = derive_events(&beatmap);
        let events = beatmap.events.len();
        let bytes = serde_json::to_vec(&beatmap).map_err(|err| failure(err.to_string()))?;
        fs::write(path, bytes).map_err(|err| failure(err.to_string()))?;
        Ok(FileOutcome::Written { events })
    }
}

/// Derives a lighting track from note and obstacle timing. The result only
/// depends on the beatmap contents and is sorted by time.
pub fn derive_events(beatmap: &Beatmap) -> Vec<LightEvent> {
    let mut notes: Vec<&Note> = beatmap.notes.iter().filter(|n| n.is_coloured()).collect();
    notes.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut events = Vec::new();
    for (index, group) in group_by_time(&notes).iter().enumerate() {
        let time = group[0].time;
        let reds = group.iter().filter(|n| n.kind == RED_NOTE).count();
        let red = reds * 2 > group.len();
        let value = match (red, group.len() > 1) {
            (true, false) => RED_ON,
            (true, true) => RED_FLASH,
            (false, false) => BLUE_ON,
            (false, true) => BLUE_FLASH,
        };
        events.push(LightEvent::new(time, LIGHT_TYPES[index % LIGHT_TYPES.len()], value));
        if index % RING_EVERY == RING_EVERY - 1 {
            events.push(LightEvent::new(time, RING_SPIN, 0));
            events.push(LightEvent::new(time, RING_ZOOM, 0));
        }
    }

    for obstacle in &beatmap.obstacles {
        events.push(LightEvent::new(obstacle.time, RING_ZOOM, 0));
    }

    events.sort_by(|a, b| a.time.total_cmp(&b.time));
    events
}

fn group_by_time<'a>(notes: &[&'a Note]) -> Vec<Vec<&'a Note>> {
    let mut groups: Vec<Vec<&Note>> = Vec::new();
    for &note in notes {
        let joins_last = groups
            .last()
            .is_some_and(|group| (note.time - group[0].time).abs() <= GROUP_EPSILON);
        match groups.last_mut() {
            Some(group) if joins_last => group.push(note),
            _ => groups.push(vec![note]),
        }
    }
    groups
}

/// Difficulty files of a level: every `.dat` except `Info.dat`, sorted.
pub fn difficulty_files(level_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(level_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_dat = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("dat"));
        let is_info = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| stem.eq_ignore_ascii_case("info"));
        if is_dat && !is_info {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
