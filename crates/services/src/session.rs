use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder};
use tracing::debug;

use autosage_domain::PipelineError;

use crate::schema::WireSchema;

pub const DEFAULT_BASE_URL: &str = "https://beatsage.com";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

/// Connection state shared read-only by every item of a run.
#[derive(Clone, Debug)]
pub struct Session {
    client: Client,
    base_url: String,
    cookie: Option<String>,
    schema: WireSchema,
}

impl Session {
    pub fn new(
        base_url: impl Into<String>,
        cookie: Option<String>,
        schema: WireSchema,
    ) -> Result<Self, PipelineError> {
        schema.validate()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .default_headers(browser_headers(&base_url)?)
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|err| PipelineError::configuration(format!("http client: {err}")))?;
        let cookie = cookie
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        debug!(base_url = %base_url, cookie = cookie.is_some(), "created session");
        Ok(Self {
            client,
            base_url,
            cookie,
            schema,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn schema(&self) -> &WireSchema {
        &self.schema
    }

    /// True when a session cookie is available for Patreon-level limits.
    pub fn has_patreon_cookie(&self) -> bool {
        self.cookie.is_some()
    }

    pub fn endpoint(&self, template: &str, job_id: &str) -> String {
        self.schema.endpoint(&self.base_url, template, job_id)
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.with_cookie(self.client.get(url))
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.with_cookie(self.client.post(url))
    }

    fn with_cookie(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.cookie {
            Some(cookie) => builder.header(header::COOKIE, cookie.as_str()),
            None => builder,
        }
    }
}

fn browser_headers(base_url: &str) -> Result<HeaderMap, PipelineError> {
    let origin = HeaderValue::from_str(base_url)
        .map_err(|err| PipelineError::configuration(format!("invalid base url: {err}")))?;
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::ORIGIN, origin.clone());
    headers.insert(header::REFERER, origin);
    headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
    headers.insert("x-kl-ajax-request", HeaderValue::from_static("Ajax_Request"));
    Ok(headers)
}
