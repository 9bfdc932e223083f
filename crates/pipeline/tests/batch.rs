use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use autosage_audio::{AudioFetcher, InputResolver, InputSource};
use autosage_domain::{
    ArtifactReference, FailureKind, JobHandle, JobRequest, JobStatus, PipelineError, StatusReport,
};
use autosage_lighting::LightingMode;
use autosage_pipeline::{ItemOutcome, Pipeline, PipelineOptions};
use autosage_services::{JobService, JobUpload, PollSettings};
use zip::write::FileOptions;

const DIFFICULTY: &str = r#"{"_version":"2.0.0","_notes":[{"_time":1.0,"_type":0},{"_time":2.0,"_type":1}],"_obstacles":[],"_events":[]}"#;

/// Finishes every job immediately unless the audio name contains `huge`,
/// which the service rejects as too large.
#[derive(Default)]
struct FakeService {
    submissions: Mutex<Vec<String>>,
    fetches: Mutex<usize>,
    never_finish: bool,
    /// Filled with a level during submit, as a concurrent run would.
    generated_meanwhile: Option<PathBuf>,
}

impl FakeService {
    fn stalled() -> Self {
        Self {
            never_finish: true,
            ..Self::default()
        }
    }

    fn racing(level: PathBuf) -> Self {
        Self {
            generated_meanwhile: Some(level),
            ..Self::default()
        }
    }

    fn fetches(&self) -> usize {
        *self.fetches.lock().unwrap()
    }

    fn submissions(&self) -> Vec<String> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobService for FakeService {
    async fn submit(&self, upload: &JobUpload<'_>) -> Result<JobHandle, PipelineError> {
        let stem = upload
            .audio_path
            .file_stem()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        self.submissions.lock().unwrap().push(stem.clone());
        if let Some(level) = &self.generated_meanwhile {
            fs::create_dir_all(level)?;
            fs::write(level.join("Info.dat"), r#"{"_songName":"earlier"}"#)?;
        }
        Ok(JobHandle::new(stem))
    }

    async fn poll(&self, handle: &JobHandle) -> Result<StatusReport, PipelineError> {
        if self.never_finish {
            return Ok(StatusReport::new(JobStatus::Processing));
        }
        if handle.id.contains("huge") {
            return Ok(StatusReport::new(JobStatus::Failed)
                .with_message("file size or song length limit exceeded"));
        }
        Ok(StatusReport::new(JobStatus::Succeeded)
            .with_download_url(format!("https://levels.test/{}", handle.id)))
    }

    async fn fetch_artifact(
        &self,
        _artifact: &ArtifactReference,
        dest: &Path,
    ) -> Result<u64, PipelineError> {
        *self.fetches.lock().unwrap() += 1;
        let mut writer = zip::ZipWriter::new(File::create(dest)?);
        for (name, body) in [
            ("Info.dat", r#"{"_songName":"x"}"#),
            ("ExpertStandard.dat", DIFFICULTY),
            ("song.egg", "ogg"),
        ] {
            writer.start_file(name, FileOptions::default()).unwrap();
            writer.write_all(body.as_bytes())?;
        }
        writer.finish().unwrap();
        Ok(fs::metadata(dest)?.len())
    }
}

/// Writes `<last path segment>.mp3` into the scratch directory. URLs
/// containing `broken` fail after leaving a partial file behind.
#[derive(Default)]
struct FakeFetcher {
    scratch_dirs: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl AudioFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, PipelineError> {
        self.scratch_dirs
            .lock()
            .unwrap()
            .push(dest_dir.to_path_buf());
        let name = url.rsplit('/').next().unwrap_or("audio");
        let path = dest_dir.join(format!("{name}.mp3"));
        fs::write(&path, b"not really audio")?;
        if url.contains("broken") {
            return Err(PipelineError::download("downloader exited with status 1"));
        }
        Ok(path)
    }
}

fn write_audio(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"not really audio").unwrap();
    path
}

#[tokio::test]
async fn two_local_files_produce_two_levels() {
    let input = tempfile::tempdir().unwrap();
    write_audio(input.path(), "first.mp3");
    write_audio(input.path(), "second.mp3");
    let resolved = InputResolver::default().resolve(input.path()).unwrap();

    let service = FakeService::default();
    let fetcher = FakeFetcher::default();
    let pipeline = Pipeline::new(&service, &fetcher, PipelineOptions::default());
    let summary = pipeline
        .run(&resolved.sources, &resolved.default_output)
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.exit_code(), 0);
    for name in ["first", "second"] {
        let level = input.path().join(name);
        assert!(level.join("Info.dat").is_file());
        assert!(level.join("ExpertStandard.dat").is_file());
        assert!(level.join("song.egg").is_file());
    }
    assert_eq!(service.submissions(), vec!["first", "second"]);
}

#[test]
fn unsupported_extension_is_rejected_before_any_work() {
    let input = tempfile::tempdir().unwrap();
    let path = write_audio(input.path(), "notes.pdf");
    let err = InputResolver::default().resolve(&path).unwrap_err();
    assert_eq!(err.kind(), FailureKind::InvalidInput);
}

#[tokio::test]
async fn one_oversized_item_fails_without_stopping_the_batch() {
    let input = tempfile::tempdir().unwrap();
    write_audio(input.path(), "a.mp3");
    write_audio(input.path(), "b-huge.mp3");
    write_audio(input.path(), "c.mp3");
    let resolved = InputResolver::default().resolve(input.path()).unwrap();

    let service = FakeService::default();
    let fetcher = FakeFetcher::default();
    let pipeline = Pipeline::new(&service, &fetcher, PipelineOptions::default());
    let summary = pipeline
        .run(&resolved.sources, &resolved.default_output)
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.exit_code(), 1);
    let failure = &summary.failures[0];
    assert_eq!(failure.kind, FailureKind::RemoteProcessing);
    assert!(failure.label.ends_with("b-huge.mp3"));
    assert!(failure.message.contains("limit exceeded"));
    assert!(input.path().join("a").is_dir());
    assert!(input.path().join("c").is_dir());
    assert!(!input.path().join("b-huge").exists());
}

#[tokio::test]
async fn url_list_failures_are_isolated_and_scratch_is_removed() {
    let input = tempfile::tempdir().unwrap();
    let list = input.path().join("videos.txt");
    fs::write(
        &list,
        "# weekend set\nhttps://videos.test/one\nnot a url\nhttps://videos.test/broken\n\nhttps://videos.test/two\n",
    )
    .unwrap();
    let resolved = InputResolver::default().resolve(&list).unwrap();
    assert_eq!(resolved.sources.len(), 4);

    let output = tempfile::tempdir().unwrap();
    let service = FakeService::default();
    let fetcher = FakeFetcher::default();
    let pipeline = Pipeline::new(&service, &fetcher, PipelineOptions::default());
    let summary = pipeline.run(&resolved.sources, output.path()).await.unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed(), 2);
    assert!(summary
        .failures
        .iter()
        .all(|failure| failure.kind == FailureKind::Download));
    assert_eq!(summary.failures[0].label, "not a url");
    assert!(output.path().join("one").is_dir());
    assert!(output.path().join("two").is_dir());

    let scratch = fetcher.scratch_dirs.lock().unwrap().clone();
    assert_eq!(scratch.len(), 3);
    assert!(scratch.iter().all(|dir| !dir.exists()));
}

#[tokio::test]
async fn rerunning_a_batch_skips_generated_levels() {
    let input = tempfile::tempdir().unwrap();
    write_audio(input.path(), "done.mp3");
    write_audio(input.path(), "fresh.mp3");
    let existing = input.path().join("done");
    fs::create_dir(&existing).unwrap();
    fs::write(existing.join("Info.dat"), "{}").unwrap();
    let resolved = InputResolver::default().resolve(input.path()).unwrap();

    let service = FakeService::default();
    let fetcher = FakeFetcher::default();
    let pipeline = Pipeline::new(&service, &fetcher, PipelineOptions::default());
    let summary = pipeline
        .run(&resolved.sources, &resolved.default_output)
        .await
        .unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(service.submissions(), vec!["fresh"]);

    let service = FakeService::default();
    let pipeline = Pipeline::new(&service, &fetcher, PipelineOptions::default());
    let summary = pipeline
        .run(&resolved.sources, &resolved.default_output)
        .await
        .unwrap();
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.exit_code(), 0);
    assert!(service.submissions().is_empty());
}

#[tokio::test]
async fn level_generated_during_the_job_is_skipped() {
    let input = tempfile::tempdir().unwrap();
    write_audio(input.path(), "contested.mp3");
    let resolved = InputResolver::default().resolve(input.path()).unwrap();
    let level = input.path().join("contested");

    let service = FakeService::racing(level.clone());
    let fetcher = FakeFetcher::default();
    let pipeline = Pipeline::new(&service, &fetcher, PipelineOptions::default());
    let summary = pipeline
        .run(&resolved.sources, &resolved.default_output)
        .await
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed(), 0);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(service.fetches(), 0);
    assert_eq!(
        fs::read_to_string(level.join("Info.dat")).unwrap(),
        r#"{"_songName":"earlier"}"#
    );
    assert!(!level.join("song.egg").exists());
}

#[tokio::test]
async fn invalid_options_stop_before_any_call() {
    let input = tempfile::tempdir().unwrap();
    write_audio(input.path(), "a.mp3");
    let resolved = InputResolver::default().resolve(input.path()).unwrap();

    let options = PipelineOptions {
        request: JobRequest {
            modes: Default::default(),
            ..JobRequest::default()
        },
        ..PipelineOptions::default()
    };
    let service = FakeService::default();
    let fetcher = FakeFetcher::default();
    let pipeline = Pipeline::new(&service, &fetcher, options);
    let err = pipeline
        .run(&resolved.sources, &resolved.default_output)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::InvalidOptions);
    assert!(service.submissions().is_empty());
    assert!(!input.path().join("a").exists());
}

#[tokio::test(start_paused = true)]
async fn stalled_jobs_time_out_and_count_as_failures() {
    let input = tempfile::tempdir().unwrap();
    write_audio(input.path(), "slow.mp3");
    let resolved = InputResolver::default().resolve(input.path()).unwrap();

    let options = PipelineOptions {
        poll: PollSettings {
            interval_secs: 5,
            base_timeout_secs: 30,
            timeout_per_audio_second: 0.0,
            max_timeout_secs: 30,
            ..PollSettings::default()
        },
        ..PipelineOptions::default()
    };
    let service = FakeService::stalled();
    let fetcher = FakeFetcher::default();
    let pipeline = Pipeline::new(&service, &fetcher, options);
    let summary = pipeline
        .run(&resolved.sources, &resolved.default_output)
        .await
        .unwrap();

    assert_eq!(summary.timed_out(), 1);
    assert_eq!(summary.exit_code(), 1);
    assert!(!input.path().join("slow").exists());
}

#[tokio::test]
async fn lighting_pass_fills_empty_event_tracks() {
    let input = tempfile::tempdir().unwrap();
    let path = write_audio(input.path(), "lit.mp3");

    let options = PipelineOptions {
        lighting: Some(LightingMode::Fill),
        ..PipelineOptions::default()
    };
    let service = FakeService::default();
    let fetcher = FakeFetcher::default();
    let pipeline = Pipeline::new(&service, &fetcher, options);
    let outcome = pipeline
        .process(&InputSource::File(path), input.path())
        .await;

    let done = match outcome {
        ItemOutcome::Succeeded(done) => done,
        other => panic!("expected success, got {other:?}"),
    };
    let lighting = done.lighting.unwrap();
    assert_eq!(lighting.written, 1);
    assert_eq!(lighting.failed, 0);

    let level: serde_json::Value =
        serde_json::from_slice(&fs::read(done.directory().join("ExpertStandard.dat")).unwrap())
            .unwrap();
    assert_eq!(level["_events"].as_array().unwrap().len(), 2);
    assert_eq!(level["_version"], "2.0.0");
}
