//! Field names, paths and status tokens of the remote API.
//!
//! The service owns this contract, so every name lives here as data that the
//! configuration file can override.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use autosage_domain::{JobStatus, PipelineError, StatusReport};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireSchema {
    pub create_path: String,
    /// `{id}` is replaced with the job id.
    pub heartbeat_path: String,
    pub download_path: String,
    pub fields: FormFields,
    pub id_field: String,
    pub status_field: String,
    pub message_field: String,
    pub download_url_field: String,
    pub statuses: StatusTokens,
}

impl Default for WireSchema {
    fn default() -> Self {
        Self {
            create_path: "/beatsaber_custom_level_create".into(),
            heartbeat_path: "/beatsaber_custom_level_heartbeat/{id}".into(),
            download_path: "/beatsaber_custom_level_download/{id}".into(),
            fields: FormFields::default(),
            id_field: "id".into(),
            status_field: "status".into(),
            message_field: "message".into(),
            download_url_field: "download_url".into(),
            statuses: StatusTokens::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormFields {
    pub audio_file: String,
    pub cover_art: String,
    pub title: String,
    pub artist: String,
    pub difficulties: String,
    pub modes: String,
    pub events: String,
    pub environment: String,
    pub model_tag: String,
}

impl Default for FormFields {
    fn default() -> Self {
        Self {
            audio_file: "audio_file".into(),
            cover_art: "cover_art".into(),
            title: "audio_metadata_title".into(),
            artist: "audio_metadata_artist".into(),
            difficulties: "difficulties".into(),
            modes: "modes".into(),
            events: "events".into(),
            environment: "environment".into(),
            model_tag: "system_tag".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusTokens {
    pub queued: Vec<String>,
    pub processing: Vec<String>,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub expired: Vec<String>,
}

impl Default for StatusTokens {
    fn default() -> Self {
        let tokens = |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };
        Self {
            queued: tokens(&["PENDING", "QUEUED"]),
            processing: tokens(&["PROCESSING", "RUNNING"]),
            succeeded: tokens(&["DONE"]),
            failed: tokens(&["ERROR"]),
            expired: tokens(&["EXPIRED"]),
        }
    }
}

impl StatusTokens {
    fn table(&self) -> [(&[String], JobStatus); 5] {
        [
            (self.queued.as_slice(), JobStatus::Queued),
            (self.processing.as_slice(), JobStatus::Processing),
            (self.succeeded.as_slice(), JobStatus::Succeeded),
            (self.failed.as_slice(), JobStatus::Failed),
            (self.expired.as_slice(), JobStatus::Expired),
        ]
    }

    pub fn parse(&self, token: &str) -> Option<JobStatus> {
        let token = token.trim();
        self.table().into_iter().find_map(|(tokens, status)| {
            tokens
                .iter()
                .any(|known| known.eq_ignore_ascii_case(token))
                .then_some(status)
        })
    }
}

impl WireSchema {
    /// Rejects schemas that would make status decoding ambiguous or leave a
    /// status unreachable.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let required = [
            ("create_path", &self.create_path),
            ("heartbeat_path", &self.heartbeat_path),
            ("download_path", &self.download_path),
            ("id_field", &self.id_field),
            ("status_field", &self.status_field),
            ("fields.audio_file", &self.fields.audio_file),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(PipelineError::configuration(format!(
                    "wire schema entry '{name}' is empty"
                )));
            }
        }

        let mut seen: Vec<String> = Vec::new();
        for (tokens, status) in self.statuses.table() {
            if tokens.is_empty() {
                return Err(PipelineError::configuration(format!(
                    "no status token configured for {status:?}"
                )));
            }
            for token in tokens {
                let normalized = token.trim().to_ascii_uppercase();
                if normalized.is_empty() || seen.contains(&normalized) {
                    return Err(PipelineError::configuration(format!(
                        "status token '{token}' is empty or listed twice"
                    )));
                }
                seen.push(normalized);
            }
        }
        Ok(())
    }

    pub fn endpoint(&self, base_url: &str, template: &str, job_id: &str) -> String {
        format!(
            "{}{}",
            base_url.trim_end_matches('/'),
            template.replace("{id}", job_id)
        )
    }

    pub fn decode_job_id(&self, body: &Value) -> Result<String, String> {
        match body.get(&self.id_field) {
            Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(format!("response has no '{}' field", self.id_field)),
        }
    }

    /// Decodes a status payload. The download URL is left empty when the
    /// payload does not name one.
    pub fn decode_status(&self, body: &Value) -> Result<StatusReport, String> {
        let token = body
            .get(&self.status_field)
            .and_then(Value::as_str)
            .ok_or_else(|| format!("response has no '{}' field", self.status_field))?;
        let status = self
            .statuses
            .parse(token)
            .ok_or_else(|| format!("unknown job status '{token}'"))?;

        let text = |field: &str| {
            body.get(field)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        Ok(StatusReport {
            status,
            message: text(&self.message_field),
            download_url: text(&self.download_url_field),
        })
    }
}
