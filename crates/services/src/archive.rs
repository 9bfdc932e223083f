use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};
use zip::ZipArchive;

use autosage_domain::{ArtifactReference, PipelineError};

use crate::client::JobService;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionReport {
    pub directory: PathBuf,
    pub files: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtractOutcome {
    Extracted(ExtractionReport),
    /// The target already held a level; nothing was written.
    AlreadyGenerated(PathBuf),
}

/// A level counts as generated once its directory exists with content.
pub fn is_already_generated(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Downloads the archive next to `target`, extracts it, and removes the
/// temporary zip. With `keep_zip` a copy is kept as `<target name>.zip`.
pub async fn download_and_extract(
    service: &dyn JobService,
    artifact: &ArtifactReference,
    target: &Path,
    keep_zip: bool,
) -> Result<ExtractOutcome, PipelineError> {
    if is_already_generated(target) {
        info!(target = %target.display(), "level appeared before download, skipping");
        return Ok(ExtractOutcome::AlreadyGenerated(target.to_path_buf()));
    }
    let parent = parent_dir(target);
    fs::create_dir_all(&parent)?;
    let temp_zip = tempfile::Builder::new()
        .prefix(".autosage-")
        .suffix(".zip")
        .tempfile_in(&parent)?;

    let bytes = service.fetch_artifact(artifact, temp_zip.path()).await?;
    debug!(path = %temp_zip.path().display(), bytes, "archive stored");

    let outcome = extract_archive(temp_zip.path(), target)?;
    if keep_zip && matches!(outcome, ExtractOutcome::Extracted(_)) {
        let copy = kept_zip_path(target);
        if let Err(err) = fs::copy(temp_zip.path(), &copy) {
            warn!(path = %copy.display(), error = %err, "could not keep archive");
        }
    }
    Ok(outcome)
}

/// Extracts `zip_path` into `target` through a staging directory, so the
/// target only appears once every entry has been written. A target that
/// already holds a level is left alone.
pub fn extract_archive(zip_path: &Path, target: &Path) -> Result<ExtractOutcome, PipelineError> {
    if is_already_generated(target) {
        info!(target = %target.display(), "already generated, skipping extraction");
        return Ok(ExtractOutcome::AlreadyGenerated(target.to_path_buf()));
    }

    let file = File::open(zip_path)?;
    let mut archive = ZipArchive::new(file)
        .map_err(|err| PipelineError::corrupt_archive(format!("{}: {err}", zip_path.display())))?;

    let staging = staging_dir(target);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let unpacked = unpack(&mut archive, &staging).and_then(|files| {
        if target.exists() {
            // Only an empty leftover can reach this point.
            fs::remove_dir(target)?;
        }
        fs::rename(&staging, target)?;
        Ok(files)
    });

    match unpacked {
        Ok(files) => {
            info!(directory = %target.display(), files, "extracted level");
            Ok(ExtractOutcome::Extracted(ExtractionReport {
                directory: target.to_path_buf(),
                files,
            }))
        }
        Err(err) => {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(path = %staging.display(), error = %cleanup, "could not remove staging directory");
                }
            }
            Err(err)
        }
    }
}

/// Returns the number of distinct files written. Repeated entry names
/// overwrite each other and count once.
fn unpack(archive: &mut ZipArchive<File>, staging: &Path) -> Result<usize, PipelineError> {
    let mut written: HashSet<PathBuf> = HashSet::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| PipelineError::corrupt_archive(err.to_string()))?;
        let relative: PathBuf = entry
            .enclosed_name()
            .ok_or_else(|| {
                PipelineError::corrupt_archive(format!("unsafe entry path '{}'", entry.name()))
            })?
            .components()
            .filter(|component| !matches!(component, Component::CurDir))
            .collect();
        let out_path = staging.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out).map_err(|err| {
            PipelineError::corrupt_archive(format!("{}: {err}", entry.name()))
        })?;
        written.insert(relative);
    }
    Ok(written.len())
}

fn parent_dir(target: &Path) -> PathBuf {
    target
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn target_name(target: &Path) -> String {
    target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "level".to_string())
}

fn staging_dir(target: &Path) -> PathBuf {
    parent_dir(target).join(format!(".{}.partial", target_name(target)))
}

/// `Path::with_extension` would cut titles such as "Mr. Brightside".
fn kept_zip_path(target: &Path) -> PathBuf {
    parent_dir(target).join(format!("{}.zip", target_name(target)))
}
