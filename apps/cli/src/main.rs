mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use autosage_audio::{InputResolver, YtDlpFetcher};
use autosage_domain::verify_option_tables;
use autosage_pipeline::{Pipeline, PipelineOptions};
use autosage_services::{BeatSageClient, Session};

use crate::config::{ConfigFile, Settings};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Generate BeatSage levels for audio files, folders or lists of video URLs"
)]
pub struct Cli {
    /// Input path, same as --input (lets files be dropped onto the binary)
    pub path: Option<PathBuf>,
    /// Audio file, directory of audio files, or .txt list of video URLs
    #[arg(short, long)]
    pub input: Option<PathBuf>,
    /// Where generated levels are written (defaults next to the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Comma-separated: normal,hard,expert,expert-plus
    #[arg(short, long)]
    pub difficulties: Option<String>,
    /// Comma-separated: standard,90-degree,no-arrows,one-saber
    #[arg(short, long)]
    pub modes: Option<String>,
    /// Comma-separated: dot-blocks,obstacles,bombs
    #[arg(short, long)]
    pub events: Option<String>,
    /// Level environment, e.g. the-first, origins, rocket-league
    #[arg(long)]
    pub environment: Option<String>,
    /// Generator model: one, two or flow
    #[arg(short = 't', long)]
    pub model_tag: Option<String>,
    /// Require Patreon limits; needs --cookie
    #[arg(long, overrides_with = "no_patreon")]
    pub patreon: bool,
    /// Turn off `patreon` from the config file
    #[arg(long, overrides_with = "patreon")]
    pub no_patreon: bool,
    /// Session cookie sent with every request
    #[arg(long, env = "AUTOSAGE_COOKIE", hide_env_values = true)]
    pub cookie: Option<String>,
    /// Descend into sub-directories when the input is a folder
    #[arg(long, overrides_with = "no_recursive")]
    pub recursive: bool,
    /// Turn off `recursive` from the config file
    #[arg(long, overrides_with = "recursive")]
    pub no_recursive: bool,
    /// Generate lighting events after extraction
    #[arg(long, overrides_with = "no_lighting")]
    pub lighting: bool,
    /// Turn off `lighting` from the config file
    #[arg(long, overrides_with = "lighting")]
    pub no_lighting: bool,
    /// Keep the downloaded archive next to the level directory
    #[arg(long, overrides_with = "no_keep_zip")]
    pub keep_zip: bool,
    /// Turn off `keep_zip` from the config file
    #[arg(long, overrides_with = "keep_zip")]
    pub no_keep_zip: bool,
    /// Config file to use instead of the default lookup
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

/// `--flag` and `--no-flag` as an override of the config value; the last
/// one given wins.
pub fn flag(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    verify_option_tables().context("option tables are inconsistent")?;

    let (file, source) = ConfigFile::discover(cli.config.as_deref())?;
    if let Some(path) = &source {
        info!(path = %path.display(), "loaded config");
    }
    let settings = Settings::merge(&cli, file)?;

    let resolved = InputResolver::new(settings.recursive)
        .resolve(&settings.input)
        .context("cannot use input")?;
    let output = settings
        .output
        .clone()
        .unwrap_or_else(|| resolved.default_output.clone());
    if resolved.sources.is_empty() {
        println!("Nothing to process in {}", settings.input.display());
        return Ok(0);
    }

    let session = Session::new(
        settings.base_url.clone(),
        settings.cookie.clone(),
        settings.schema.clone(),
    )?;
    let client = BeatSageClient::new(&session);
    let fetcher = YtDlpFetcher::new(settings.downloader.program.clone())
        .with_audio_format(settings.downloader.audio_format.clone());

    let options = PipelineOptions {
        request: settings.request,
        poll: settings.polling,
        lighting: settings.lighting,
        keep_zip: settings.keep_zip,
    };
    let pipeline =
        Pipeline::new(&client, &fetcher, options).with_patreon_cookie(session.has_patreon_cookie());

    info!(
        kind = ?resolved.kind,
        items = resolved.sources.len(),
        output = %output.display(),
        "starting run"
    );
    let summary = pipeline.run(&resolved.sources, &output).await?;

    println!("{summary}");
    for failure in &summary.failures {
        println!("  failed: {} ({}): {}", failure.label, failure.kind, failure.message);
    }
    Ok(summary.exit_code() as u8)
}
