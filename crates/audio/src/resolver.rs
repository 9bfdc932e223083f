use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use autosage_domain::{PipelineError, TrackMetadata};

use crate::fetch::AudioFetcher;
use crate::metadata::MetadataExtractor;

pub const AUDIO_EXTENSIONS: &[&str] = &[
    "opus", "flac", "webm", "weba", "wav", "ogg", "m4a", "mp3", "oga", "mid", "amr", "aac", "wma",
];

const URL_LIST_EXTENSION: &str = "txt";

pub fn is_supported_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    Directory,
    AudioFile,
    UrlList,
}

/// One unit of work before its audio is available locally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputSource {
    File(PathBuf),
    Url(String),
}

impl InputSource {
    /// Path or URL, for log lines and the run summary.
    pub fn label(&self) -> String {
        match self {
            InputSource::File(path) => path.display().to_string(),
            InputSource::Url(url) => url.clone(),
        }
    }

    /// Makes the audio available locally and reads its metadata.
    ///
    /// URL sources download into a scratch directory owned by the returned
    /// item; it is removed when the item is dropped or when this call fails.
    pub async fn acquire(
        &self,
        fetcher: &dyn AudioFetcher,
        output_dir: &Path,
    ) -> Result<InputItem, PipelineError> {
        match self {
            InputSource::File(path) => Ok(InputItem {
                label: self.label(),
                source_path: path.clone(),
                metadata: MetadataExtractor::extract(path),
                output_dir: output_dir.to_path_buf(),
                scratch: None,
            }),
            InputSource::Url(url) => {
                let scheme_ok = url.starts_with("http://") || url.starts_with("https://");
                if !scheme_ok || url.contains(char::is_whitespace) {
                    return Err(PipelineError::download(format!("malformed URL '{url}'")));
                }
                let scratch = tempfile::Builder::new().prefix("autosage-").tempdir()?;
                let audio = fetcher.fetch(url, scratch.path()).await?;
                Ok(InputItem {
                    label: self.label(),
                    metadata: MetadataExtractor::extract(&audio),
                    source_path: audio,
                    output_dir: output_dir.to_path_buf(),
                    scratch: Some(scratch),
                })
            }
        }
    }
}

/// An audio asset ready for submission.
#[derive(Debug)]
pub struct InputItem {
    pub label: String,
    pub source_path: PathBuf,
    pub metadata: TrackMetadata,
    pub output_dir: PathBuf,
    scratch: Option<TempDir>,
}

impl InputItem {
    pub fn new(
        label: impl Into<String>,
        source_path: PathBuf,
        metadata: TrackMetadata,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            label: label.into(),
            source_path,
            metadata,
            output_dir,
            scratch: None,
        }
    }

    pub fn smart_filename(&self) -> String {
        self.metadata.smart_filename()
    }

    /// Directory the generated level is extracted into.
    pub fn target_dir(&self) -> PathBuf {
        self.output_dir.join(self.smart_filename())
    }

    pub fn scratch_dir(&self) -> Option<&Path> {
        self.scratch.as_ref().map(|dir| dir.path())
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedInput {
    pub kind: InputKind,
    pub sources: Vec<InputSource>,
    /// Where output goes when the caller did not choose a directory.
    pub default_output: PathBuf,
}

#[derive(Clone, Debug, Default)]
pub struct InputResolver {
    recursive: bool,
}

impl InputResolver {
    pub fn new(recursive: bool) -> Self {
        Self { recursive }
    }

    pub fn resolve(&self, path: &Path) -> Result<ResolvedInput, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::invalid_input(format!(
                "input path does not exist: {}",
                path.display()
            )));
        }

        if path.is_dir() {
            let sources = self.scan_directory(path);
            info!(
                path = %path.display(),
                count = sources.len(),
                recursive = self.recursive,
                "scanned input directory"
            );
            return Ok(ResolvedInput {
                kind: InputKind::Directory,
                sources,
                default_output: path.to_path_buf(),
            });
        }

        let default_output = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        if is_supported_audio(path) {
            return Ok(ResolvedInput {
                kind: InputKind::AudioFile,
                sources: vec![InputSource::File(path.to_path_buf())],
                default_output,
            });
        }

        let is_url_list = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(URL_LIST_EXTENSION))
            .unwrap_or(false);
        if is_url_list {
            let text = std::fs::read_to_string(path).map_err(|err| {
                PipelineError::invalid_input(format!(
                    "cannot read URL list {}: {err}",
                    path.display()
                ))
            })?;
            let sources = parse_url_list(&text);
            info!(path = %path.display(), count = sources.len(), "loaded URL list");
            return Ok(ResolvedInput {
                kind: InputKind::UrlList,
                sources,
                default_output,
            });
        }

        Err(PipelineError::invalid_input(format!(
            "unsupported input file type: {}",
            path.display()
        )))
    }

    fn scan_directory(&self, root: &Path) -> Vec<InputSource> {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut files = Vec::new();
        for entry in WalkDir::new(root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
        {
            match entry {
                Ok(entry) if entry.file_type().is_file() && is_supported_audio(entry.path()) => {
                    files.push(InputSource::File(entry.into_path()));
                }
                Ok(entry) => debug!(path = %entry.path().display(), "skipping entry"),
                Err(err) => warn!(error = %err, "error accessing entry"),
            }
        }
        files
    }
}

fn parse_url_list(text: &str) -> Vec<InputSource> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| InputSource::Url(line.to_string()))
        .collect()
}
