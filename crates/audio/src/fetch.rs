use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use autosage_domain::PipelineError;

use crate::resolver::is_supported_audio;

/// Downloads a remote video and leaves a local audio file in `dest_dir`.
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, PipelineError>;
}

/// Shells out to `yt-dlp`, which needs `ffmpeg` on the path for transcoding.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    program: PathBuf,
    audio_format: String,
}

impl YtDlpFetcher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            audio_format: "mp3".to_string(),
        }
    }

    pub fn with_audio_format(mut self, format: impl Into<String>) -> Self {
        self.audio_format = format.into();
        self
    }

    fn build_args(&self, url: &str, dest_dir: &Path) -> Vec<String> {
        vec![
            "--no-playlist".into(),
            "--extract-audio".into(),
            "--audio-format".into(),
            self.audio_format.clone(),
            "--output".into(),
            dest_dir.join("%(title)s.%(ext)s").to_string_lossy().into_owned(),
            url.to_string(),
        ]
    }
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

#[async_trait]
impl AudioFetcher for YtDlpFetcher {
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, PipelineError> {
        let args = self.build_args(url, dest_dir);
        debug!(program = %self.program.display(), ?args, "spawning downloader");
        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| {
                PipelineError::download(format!(
                    "could not run {}: {err}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no output");
            return Err(PipelineError::download(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                reason.trim()
            )));
        }

        let audio = first_audio_file(dest_dir)?.ok_or_else(|| {
            PipelineError::download(format!("no audio file produced for {url}"))
        })?;
        info!(url, path = %audio.display(), "downloaded audio");
        Ok(audio)
    }
}

fn first_audio_file(dir: &Path) -> Result<Option<PathBuf>, PipelineError> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file() && is_supported_audio(path))
        .collect();
    candidates.sort();
    Ok(candidates.into_iter().next())
}
