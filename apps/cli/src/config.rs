use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use autosage_domain::{
    parse_option_list, Difficulty, Environment, Event, JobRequest, Mode, ModelTag, RemoteOption,
};
use autosage_lighting::LightingMode;
use autosage_services::{PollSettings, WireSchema, DEFAULT_BASE_URL};

use crate::{flag, Cli};

pub const SIBLING_CONFIG: &str = "autosage.yaml";

/// Contents of `autosage.yaml`. Every field is optional.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub difficulties: Vec<String>,
    pub modes: Vec<String>,
    pub events: Vec<String>,
    pub environment: String,
    pub model_tag: String,
    pub patreon: bool,
    pub cookie: Option<String>,
    pub recursive: bool,
    pub keep_zip: bool,
    pub base_url: String,
    pub downloader: DownloaderConfig,
    pub lighting: LightingConfig,
    pub polling: PollSettings,
    pub schema: WireSchema,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            difficulties: public_names::<Difficulty>(),
            modes: public_names::<Mode>(),
            events: public_names::<Event>(),
            environment: Environment::TheFirst.public_name().to_string(),
            model_tag: ModelTag::V2.public_name().to_string(),
            patreon: false,
            cookie: None,
            recursive: false,
            keep_zip: false,
            base_url: DEFAULT_BASE_URL.to_string(),
            downloader: DownloaderConfig::default(),
            lighting: LightingConfig::default(),
            polling: PollSettings::default(),
            schema: WireSchema::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    pub program: PathBuf,
    pub audio_format: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
            audio_format: "mp3".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub enabled: bool,
    pub mode: LightingMode,
}

impl ConfigFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Loads the first config found: the explicit path, `autosage.yaml`
    /// next to the executable, then the user config directory. An explicit
    /// path must exist; the others fall back to defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::from_path(path)?, Some(path.to_path_buf())));
        }
        for candidate in default_locations() {
            if candidate.is_file() {
                debug!(path = %candidate.display(), "using config file");
                return Ok((Self::from_path(&candidate)?, Some(candidate)));
            }
        }
        Ok((Self::default(), None))
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        paths.push(dir.join(SIBLING_CONFIG));
    }
    if let Some(base) = dirs::config_dir() {
        paths.push(base.join("autosage").join("config.yaml"));
    }
    paths
}

fn public_names<T: RemoteOption>() -> Vec<String> {
    T::ALL.iter().map(|o| o.public_name().to_string()).collect()
}

/// Effective settings after command-line values override the file.
#[derive(Clone, Debug)]
pub struct Settings {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub request: JobRequest,
    pub cookie: Option<String>,
    pub recursive: bool,
    pub keep_zip: bool,
    pub lighting: Option<LightingMode>,
    pub base_url: String,
    pub downloader: DownloaderConfig,
    pub polling: PollSettings,
    pub schema: WireSchema,
}

impl Settings {
    pub fn merge(cli: &Cli, file: ConfigFile) -> Result<Self> {
        let Some(input) = cli.input.clone().or_else(|| cli.path.clone()).or(file.input) else {
            bail!("no input given: pass a file, directory or URL list, or set `input` in {SIBLING_CONFIG}");
        };

        let difficulties = match &cli.difficulties {
            Some(list) => parse_option_list::<Difficulty>(list)?,
            None => parse_option_list::<Difficulty>(&file.difficulties.join(","))?,
        };
        let modes = match &cli.modes {
            Some(list) => parse_option_list::<Mode>(list)?,
            None => parse_option_list::<Mode>(&file.modes.join(","))?,
        };
        let events = match &cli.events {
            Some(list) => parse_option_list::<Event>(list)?,
            None => parse_option_list::<Event>(&file.events.join(","))?,
        };
        let environment =
            Environment::parse_public(cli.environment.as_deref().unwrap_or(&file.environment))?;
        let model = ModelTag::parse_public(cli.model_tag.as_deref().unwrap_or(&file.model_tag))?;

        let lighting = flag(cli.lighting, cli.no_lighting)
            .unwrap_or(file.lighting.enabled)
            .then_some(file.lighting.mode);

        Ok(Self {
            input,
            output: cli.output.clone().or(file.output),
            request: JobRequest {
                difficulties,
                modes,
                events,
                environment,
                model,
                requires_patreon: flag(cli.patreon, cli.no_patreon).unwrap_or(file.patreon),
            },
            cookie: cli.cookie.clone().or(file.cookie),
            recursive: flag(cli.recursive, cli.no_recursive).unwrap_or(file.recursive),
            keep_zip: flag(cli.keep_zip, cli.no_keep_zip).unwrap_or(file.keep_zip),
            lighting,
            base_url: file.base_url,
            downloader: file.downloader,
            polling: file.polling,
            schema: file.schema,
        })
    }
}
