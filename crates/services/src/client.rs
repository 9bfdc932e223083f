use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use autosage_domain::{
    join_tokens, ArtifactReference, JobHandle, JobRequest, JobStatus, PipelineError, RemoteOption,
    StatusReport, TrackMetadata,
};

use crate::session::Session;

const SIZE_LIMIT_MESSAGE: &str =
    "file size or song length limit exceeded (32MB, 10min for non-Patreon supporters)";

/// Everything the service needs to start one job.
#[derive(Debug, Clone, Copy)]
pub struct JobUpload<'a> {
    pub audio_path: &'a Path,
    pub metadata: &'a TrackMetadata,
    pub request: &'a JobRequest,
}

/// The three calls the pipeline makes against the remote service.
#[async_trait]
pub trait JobService: Send + Sync {
    async fn submit(&self, upload: &JobUpload<'_>) -> Result<JobHandle, PipelineError>;

    /// One status request. Errors are treated as transient by the poller.
    async fn poll(&self, handle: &JobHandle) -> Result<StatusReport, PipelineError>;

    /// Writes the archive to `dest` and returns the number of bytes written.
    async fn fetch_artifact(
        &self,
        artifact: &ArtifactReference,
        dest: &Path,
    ) -> Result<u64, PipelineError>;
}

pub struct BeatSageClient<'s> {
    session: &'s Session,
}

impl<'s> BeatSageClient<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    fn build_form(&self, upload: &JobUpload<'_>, audio: Vec<u8>) -> Result<Form, PipelineError> {
        let fields = &self.session.schema().fields;
        let file_name = upload
            .audio_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio_file".to_string());
        let audio_part = Part::bytes(audio)
            .file_name(file_name)
            .mime_str(audio_mime(upload.audio_path))
            .map_err(|err| PipelineError::configuration(format!("audio mime: {err}")))?;

        let request = upload.request;
        let mut form = Form::new()
            .text(fields.title.clone(), upload.metadata.title.clone())
            .text(fields.artist.clone(), upload.metadata.artist.clone())
            .text(fields.difficulties.clone(), join_tokens(&request.difficulties))
            .text(fields.modes.clone(), join_tokens(&request.modes))
            .text(fields.events.clone(), join_tokens(&request.events))
            .text(
                fields.environment.clone(),
                request.environment.remote_token(),
            )
            .text(fields.model_tag.clone(), request.model.remote_token())
            .part(fields.audio_file.clone(), audio_part);

        if let Some(cover) = &upload.metadata.cover_art {
            match Part::bytes(cover.data.clone())
                .file_name("cover_art")
                .mime_str(&cover.media_type)
            {
                Ok(part) => form = form.part(fields.cover_art.clone(), part),
                Err(err) => warn!(media_type = %cover.media_type, error = %err, "skipping cover art"),
            }
        }
        Ok(form)
    }
}

#[async_trait]
impl JobService for BeatSageClient<'_> {
    #[instrument(skip_all, fields(path = %upload.audio_path.display()))]
    async fn submit(&self, upload: &JobUpload<'_>) -> Result<JobHandle, PipelineError> {
        let audio = tokio::fs::read(upload.audio_path).await?;
        let size = audio.len();
        let form = self.build_form(upload, audio)?;
        let url = format!(
            "{}{}",
            self.session.base_url(),
            self.session.schema().create_path
        );
        debug!(url = %url, bytes = size, "submitting job");

        let response = self
            .session
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| PipelineError::Submission {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return Err(PipelineError::Submission {
                status: Some(status.as_u16()),
                message: SIZE_LIMIT_MESSAGE.into(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Submission {
                status: Some(status.as_u16()),
                message: summarize_body(&body),
            });
        }

        let body: Value = response.json().await.map_err(|err| PipelineError::Submission {
            status: Some(status.as_u16()),
            message: format!("invalid response: {err}"),
        })?;
        let id = self
            .session
            .schema()
            .decode_job_id(&body)
            .map_err(|message| PipelineError::Submission {
                status: Some(status.as_u16()),
                message,
            })?;
        info!(job = %id, "job submitted");
        Ok(JobHandle::new(id))
    }

    async fn poll(&self, handle: &JobHandle) -> Result<StatusReport, PipelineError> {
        let schema = self.session.schema();
        let url = self.session.endpoint(&schema.heartbeat_path, &handle.id);
        let response = self
            .session
            .get(&url)
            .send()
            .await
            .map_err(|err| PipelineError::Network(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Network(format!(
                "status endpoint returned {status}"
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|err| PipelineError::Network(format!("invalid status payload: {err}")))?;
        let mut report = schema.decode_status(&body).map_err(PipelineError::Network)?;
        if report.status == JobStatus::Succeeded && report.download_url.is_none() {
            report.download_url = Some(self.session.endpoint(&schema.download_path, &handle.id));
        }
        Ok(report)
    }

    async fn fetch_artifact(
        &self,
        artifact: &ArtifactReference,
        dest: &Path,
    ) -> Result<u64, PipelineError> {
        let mut response = self
            .session
            .get(artifact.url())
            .send()
            .await
            .map_err(|err| PipelineError::download(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::download(format!(
                "{} returned {status}",
                artifact.url()
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| PipelineError::download(err.to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        debug!(url = artifact.url(), bytes = written, "downloaded archive");
        Ok(written)
    }
}

fn audio_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "m4a" | "aac" => "audio/aac",
        "webm" | "weba" => "audio/webm",
        "wma" => "audio/x-ms-wma",
        "amr" => "audio/amr",
        "mid" => "audio/midi",
        _ => "audio/mpeg",
    }
}

fn summarize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response".to_string();
    }
    let mut summary: String = trimmed.chars().take(200).collect();
    if trimmed.chars().count() > 200 {
        summary.push('…');
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use crate::schema::WireSchema;

    type Requests = Arc<Mutex<Vec<String>>>;

    /// Serves one canned HTTP response per accepted connection and records
    /// each request, head and body, as lossy text.
    async fn serve(responses: Vec<(u16, &'static str, Vec<u8>)>) -> (String, Requests) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Requests::default();
        let seen = Arc::clone(&requests);
        tokio::spawn(async move {
            for (status, content_type, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let raw = read_request(&mut socket).await;
                seen.lock().unwrap().push(String::from_utf8_lossy(&raw).into_owned());
                let head = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                socket.write_all(head.as_bytes()).await.unwrap();
                socket.write_all(&body).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });
        (format!("http://{addr}"), requests)
    }

    async fn read_request(socket: &mut TcpStream) -> Vec<u8> {
        let mut buf = vec![0u8; 8192];
        let mut read = Vec::new();
        loop {
            if let Some(end) = read.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&read[..end]).to_ascii_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok());
                let complete = match length {
                    Some(length) => read.len() >= end + 4 + length,
                    None if head.contains("transfer-encoding: chunked") => {
                        read.ends_with(b"0\r\n\r\n")
                    }
                    None => true,
                };
                if complete {
                    return read;
                }
            }
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return read;
            }
            read.extend_from_slice(&buf[..n]);
        }
    }

    struct UploadFixture {
        _dir: tempfile::TempDir,
        audio: std::path::PathBuf,
        metadata: TrackMetadata,
        request: JobRequest,
    }

    impl UploadFixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let audio = dir.path().join("song.mp3");
            std::fs::write(&audio, b"not really audio").unwrap();
            Self {
                _dir: dir,
                audio,
                metadata: TrackMetadata {
                    title: "Song".into(),
                    artist: "Band".into(),
                    ..TrackMetadata::default()
                },
                request: JobRequest::default(),
            }
        }

        fn upload(&self) -> JobUpload<'_> {
            JobUpload {
                audio_path: &self.audio,
                metadata: &self.metadata,
                request: &self.request,
            }
        }
    }

    #[test]
    fn mime_follows_extension() {
        assert_eq!(audio_mime(Path::new("a.MP3")), "audio/mpeg");
        assert_eq!(audio_mime(Path::new("a.flac")), "audio/flac");
        assert_eq!(audio_mime(Path::new("a")), "audio/mpeg");
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(500);
        assert_eq!(summarize_body(&body).chars().count(), 201);
        assert_eq!(summarize_body("  "), "empty response");
    }

    #[tokio::test]
    async fn submit_sends_metadata_and_options_as_multipart() {
        let (base, requests) =
            serve(vec![(200, "application/json", br#"{"id":"job-7"}"#.to_vec())]).await;
        let session =
            Session::new(base, Some("sid=1".into()), WireSchema::default()).unwrap();
        let fixture = UploadFixture::new();
        let handle = BeatSageClient::new(&session)
            .submit(&fixture.upload())
            .await
            .unwrap();
        assert_eq!(handle.id, "job-7");

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let raw = &requests[0];
        let lower = raw.to_ascii_lowercase();
        assert!(lower.starts_with("post /beatsaber_custom_level_create "));
        assert!(lower.contains("cookie: sid=1"));
        assert!(raw.contains("name=\"audio_metadata_title\"\r\n\r\nSong\r\n"));
        assert!(raw.contains("name=\"audio_metadata_artist\"\r\n\r\nBand\r\n"));
        assert!(raw.contains("name=\"system_tag\"\r\n\r\nv2\r\n"));
        assert!(raw.contains("name=\"difficulties\"\r\n\r\nNormal,Hard,Expert,ExpertPlus\r\n"));
        assert!(raw.contains("name=\"audio_file\"; filename=\"song.mp3\""));
        assert!(raw.contains("not really audio"));
    }

    #[tokio::test]
    async fn submit_maps_payload_too_large_to_size_limit() {
        let (base, _) = serve(vec![(413, "text/html", b"<h1>too big</h1>".to_vec())]).await;
        let session = Session::new(base, None, WireSchema::default()).unwrap();
        let fixture = UploadFixture::new();
        let err = BeatSageClient::new(&session)
            .submit(&fixture.upload())
            .await
            .unwrap_err();
        match err {
            PipelineError::Submission { status, message } => {
                assert_eq!(status, Some(413));
                assert_eq!(message, SIZE_LIMIT_MESSAGE);
            }
            other => panic!("expected a submission error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn submit_server_errors_keep_status_and_body() {
        let (base, _) = serve(vec![(500, "text/plain", b"boom".to_vec())]).await;
        let session = Session::new(base, None, WireSchema::default()).unwrap();
        let fixture = UploadFixture::new();
        let err = BeatSageClient::new(&session)
            .submit(&fixture.upload())
            .await
            .unwrap_err();
        match err {
            PipelineError::Submission { status, message } => {
                assert_eq!(status, Some(500));
                assert_eq!(message, "boom");
            }
            other => panic!("expected a submission error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn submit_without_job_id_is_a_submission_error() {
        let (base, _) = serve(vec![(200, "application/json", b"{}".to_vec())]).await;
        let session = Session::new(base, None, WireSchema::default()).unwrap();
        let fixture = UploadFixture::new();
        let err = BeatSageClient::new(&session)
            .submit(&fixture.upload())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Submission { status: Some(200), .. }
        ));
    }

    #[tokio::test]
    async fn poll_fills_in_conventional_download_url() {
        let (base, _) = serve(vec![(200, "application/json", br#"{"status":"DONE"}"#.to_vec())]).await;
        let session = Session::new(base.clone(), None, WireSchema::default()).unwrap();
        let client = BeatSageClient::new(&session);
        let report = client.poll(&JobHandle::new("abc")).await.unwrap();
        assert_eq!(report.status, JobStatus::Succeeded);
        assert_eq!(
            report.download_url.as_deref(),
            Some(format!("{base}/beatsaber_custom_level_download/abc").as_str())
        );
    }

    #[tokio::test]
    async fn poll_http_errors_are_network_errors() {
        let (base, _) = serve(vec![(502, "text/plain", b"bad gateway".to_vec())]).await;
        let session = Session::new(base, None, WireSchema::default()).unwrap();
        let client = BeatSageClient::new(&session);
        let err = client.poll(&JobHandle::new("abc")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Network(_)));
    }

    #[tokio::test]
    async fn fetch_artifact_writes_body_to_disk() {
        let payload = b"PK\x05\x06archive-bytes".to_vec();
        let (base, _) = serve(vec![(200, "application/zip", payload.clone())]).await;
        let session = Session::new(base.clone(), None, WireSchema::default()).unwrap();
        let client = BeatSageClient::new(&session);
        let report = StatusReport::new(JobStatus::Succeeded).with_download_url(format!("{base}/dl"));
        let artifact = report.artifact().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("level.zip");
        let written = client.fetch_artifact(&artifact, &dest).await.unwrap();
        assert_eq!(written, payload.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), payload);
    }

    #[tokio::test]
    async fn fetch_artifact_reports_http_failure() {
        let (base, _) = serve(vec![(404, "text/plain", b"gone".to_vec())]).await;
        let session = Session::new(base.clone(), None, WireSchema::default()).unwrap();
        let client = BeatSageClient::new(&session);
        let report = StatusReport::new(JobStatus::Succeeded).with_download_url(format!("{base}/dl"));
        let dir = tempfile::tempdir().unwrap();
        let err = client
            .fetch_artifact(&report.artifact().unwrap(), &dir.path().join("x.zip"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Download(_)));
    }
}
