use std::fs::File;
use std::path::Path;

use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey, StandardVisualKey};
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use autosage_domain::{CoverArt, PipelineError, TrackMetadata};

pub struct MetadataExtractor;

impl MetadataExtractor {
    /// Reads tags, falling back to the file stem when they are missing or the
    /// file cannot be probed. Never fails.
    pub fn extract<P: AsRef<Path>>(path: P) -> TrackMetadata {
        let path_ref = path.as_ref();
        let stem = file_stem(path_ref);
        match Self::read(path_ref) {
            Ok(mut metadata) => {
                if metadata.title.is_empty() {
                    metadata.title = stem;
                }
                metadata
            }
            Err(err) => {
                warn!(path = %path_ref.display(), error = %err, "falling back to file name");
                TrackMetadata::from_stem(stem)
            }
        }
    }

    /// Strict variant of [`extract`](Self::extract): an unreadable file is a
    /// `MetadataRead` error and absent tags come back as empty strings.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<TrackMetadata, PipelineError> {
        let path_ref = path.as_ref();
        let read_error = |reason: String| PipelineError::MetadataRead {
            path: path_ref.to_path_buf(),
            reason,
        };

        let file = File::open(path_ref).map_err(|err| read_error(err.to_string()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = path_ref.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(ext);
        }

        let mut probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|err| read_error(err.to_string()))?;

        let mut metadata = TrackMetadata::default();
        {
            let container = probed.format.metadata();
            if let Some(revision) = container.current() {
                absorb_revision(&mut metadata, revision);
            }
        }
        // Tags found ahead of the stream, e.g. an ID3v2 block.
        if let Some(probe_metadata) = probed.metadata.get() {
            if let Some(revision) = probe_metadata.current() {
                absorb_revision(&mut metadata, revision);
            }
        }

        if let Some(track) = probed.format.default_track() {
            let params = &track.codec_params;
            metadata.duration_secs = match (params.time_base, params.n_frames, params.sample_rate) {
                (Some(time_base), Some(frames), _) => {
                    let time = time_base.calc_time(frames);
                    Some(time.seconds as f64 + time.frac)
                }
                (None, Some(frames), Some(rate)) if rate > 0 => Some(frames as f64 / rate as f64),
                _ => None,
            };
        }

        debug!(
            path = %path_ref.display(),
            title = %metadata.title,
            artist = %metadata.artist,
            duration = ?metadata.duration_secs,
            cover = metadata.cover_art.is_some(),
            "read audio metadata"
        );
        Ok(metadata)
    }
}

fn absorb_revision(metadata: &mut TrackMetadata, revision: &MetadataRevision) {
    for tag in revision.tags() {
        let value = tag.value.to_string();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match tag.std_key {
            Some(StandardTagKey::TrackTitle) if metadata.title.is_empty() => {
                metadata.title = value.to_string();
            }
            Some(StandardTagKey::Artist) if metadata.artist.is_empty() => {
                metadata.artist = value.to_string();
            }
            _ => {}
        }
    }

    let front = revision
        .visuals()
        .iter()
        .find(|visual| visual.usage == Some(StandardVisualKey::FrontCover))
        .or_else(|| revision.visuals().first());
    if let (None, Some(visual)) = (&metadata.cover_art, front) {
        metadata.cover_art = Some(CoverArt {
            media_type: visual.media_type.clone(),
            data: visual.data.to_vec(),
        });
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
