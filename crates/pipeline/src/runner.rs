use std::path::Path;

use tracing::{error, info, instrument, warn};

use autosage_audio::{AudioFetcher, InputSource};
use autosage_domain::{JobRequest, PipelineError};
use autosage_lighting::{LightingGenerator, LightingMode, LightingReport};
use autosage_services::{
    download_and_extract, is_already_generated, poll_until_terminal, ExtractOutcome,
    ExtractionReport, JobService, JobUpload, PollSettings,
};

use crate::summary::{ItemOutcome, RunSummary};

/// Settings shared by every item of a run.
#[derive(Clone, Debug, Default)]
pub struct PipelineOptions {
    pub request: JobRequest,
    pub poll: PollSettings,
    /// Lighting pass after extraction, if enabled.
    pub lighting: Option<LightingMode>,
    pub keep_zip: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedItem {
    pub extraction: ExtractionReport,
    pub lighting: Option<LightingReport>,
}

impl CompletedItem {
    pub fn directory(&self) -> &Path {
        &self.extraction.directory
    }
}

pub struct Pipeline<'a> {
    service: &'a dyn JobService,
    fetcher: &'a dyn AudioFetcher,
    patreon_cookie: bool,
    options: PipelineOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        service: &'a dyn JobService,
        fetcher: &'a dyn AudioFetcher,
        options: PipelineOptions,
    ) -> Self {
        Self {
            service,
            fetcher,
            patreon_cookie: false,
            options,
        }
    }

    pub fn with_patreon_cookie(mut self, present: bool) -> Self {
        self.patreon_cookie = present;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Checks that apply to the whole run. Nothing is sent when these fail.
    pub fn preflight(&self) -> Result<(), PipelineError> {
        self.options.request.validate()?;
        if self.options.request.requires_patreon && !self.patreon_cookie {
            return Err(PipelineError::configuration(
                "a Patreon session cookie is required but none was provided",
            ));
        }
        Ok(())
    }

    /// Processes every source in order. Per-item errors end up in the
    /// summary; only a failed preflight or an unusable output directory
    /// aborts the run.
    #[instrument(skip_all, fields(items = sources.len(), output = %output_dir.display()))]
    pub async fn run(
        &self,
        sources: &[InputSource],
        output_dir: &Path,
    ) -> Result<RunSummary, PipelineError> {
        self.preflight()?;
        std::fs::create_dir_all(output_dir)?;

        let mut summary = RunSummary::default();
        let total = sources.len();
        for (index, source) in sources.iter().enumerate() {
            let label = source.label();
            println!("[{}/{}] {}", index + 1, total, display_name(source));
            let outcome = self.process(source, output_dir).await;
            match &outcome {
                ItemOutcome::Succeeded(done) => {
                    println!("      done -> {}", done.directory().display());
                }
                ItemOutcome::Skipped(dir) => {
                    println!("      skipped, already generated in {}", dir.display());
                }
                ItemOutcome::Failed(err) => {
                    error!(source = %label, kind = %err.kind(), error = %err, "item failed");
                    println!("      failed ({}): {err}", err.kind());
                }
            }
            summary.record(&label, &outcome);
        }
        info!(
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed(),
            timed_out = summary.timed_out(),
            "run finished"
        );
        Ok(summary)
    }

    pub async fn process(&self, source: &InputSource, output_dir: &Path) -> ItemOutcome {
        match self.process_item(source, output_dir).await {
            Ok(outcome) => outcome,
            Err(err) => ItemOutcome::Failed(err),
        }
    }

    #[instrument(skip(self, output_dir), fields(source = %source.label()))]
    async fn process_item(
        &self,
        source: &InputSource,
        output_dir: &Path,
    ) -> Result<ItemOutcome, PipelineError> {
        // Scratch files of URL sources live as long as `item`.
        let item = source.acquire(self.fetcher, output_dir).await?;
        let target = item.target_dir();
        if is_already_generated(&target) {
            info!(target = %target.display(), "already generated, skipping");
            return Ok(ItemOutcome::Skipped(target));
        }

        let upload = JobUpload {
            audio_path: &item.source_path,
            metadata: &item.metadata,
            request: &self.options.request,
        };
        let handle = self.service.submit(&upload).await?;
        let policy = self.options.poll.policy_for(item.metadata.duration_secs);
        let artifact = poll_until_terminal(self.service, &handle, &policy).await?;
        let extraction =
            match download_and_extract(self.service, &artifact, &target, self.options.keep_zip)
                .await?
            {
                ExtractOutcome::Extracted(report) => report,
                // Another run filled the target while this job was pending.
                ExtractOutcome::AlreadyGenerated(dir) => return Ok(ItemOutcome::Skipped(dir)),
            };

        let lighting = self
            .options
            .lighting
            .map(|mode| LightingGenerator::new(mode).process_level(&extraction.directory));
        if let Some(report) = lighting.filter(|report| report.failed > 0) {
            warn!(failed = report.failed, "some difficulty files kept their original lighting");
        }
        Ok(ItemOutcome::Succeeded(CompletedItem {
            extraction,
            lighting,
        }))
    }
}

fn display_name(source: &InputSource) -> String {
    match source {
        InputSource::File(path) => path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.label()),
        InputSource::Url(url) => url.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use async_trait::async_trait;
    use autosage_domain::{ArtifactReference, JobHandle, JobStatus, StatusReport};

    struct Unreachable;

    #[async_trait]
    impl JobService for Unreachable {
        async fn submit(&self, _upload: &JobUpload<'_>) -> Result<JobHandle, PipelineError> {
            panic!("submit must not be called")
        }

        async fn poll(&self, _handle: &JobHandle) -> Result<StatusReport, PipelineError> {
            Ok(StatusReport::new(JobStatus::Processing))
        }

        async fn fetch_artifact(
            &self,
            _artifact: &ArtifactReference,
            _dest: &Path,
        ) -> Result<u64, PipelineError> {
            panic!("fetch must not be called")
        }
    }

    #[async_trait]
    impl AudioFetcher for Unreachable {
        async fn fetch(&self, _url: &str, _dest: &Path) -> Result<PathBuf, PipelineError> {
            panic!("fetch must not be called")
        }
    }

    #[test]
    fn patreon_jobs_need_a_cookie() {
        let options = PipelineOptions {
            request: JobRequest {
                requires_patreon: true,
                ..JobRequest::default()
            },
            ..PipelineOptions::default()
        };
        let pipeline = Pipeline::new(&Unreachable, &Unreachable, options.clone());
        assert!(matches!(
            pipeline.preflight(),
            Err(PipelineError::Configuration(_))
        ));
        let pipeline = Pipeline::new(&Unreachable, &Unreachable, options).with_patreon_cookie(true);
        assert!(pipeline.preflight().is_ok());
    }

    #[test]
    fn display_name_prefers_file_name() {
        let source = InputSource::File(PathBuf::from("/music/set/track.mp3"));
        assert_eq!(display_name(&source), "track.mp3");
        let source = InputSource::Url("https://example.com/v".into());
        assert_eq!(display_name(&source), "https://example.com/v");
    }
}
