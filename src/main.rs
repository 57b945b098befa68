use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use revoice::config::Config;
use revoice::convert::RvcConverter;
use revoice::media::Ffmpeg;
use revoice::server::{create_router, AppState};
use revoice::{print_summary, Pipeline};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "revoice")]
#[command(version, about = "Convert the voice in a video using RVC")]
#[command(long_about = "Replace the voice track of a video with an RVC-converted one, \
processing long audio in fixed-length chunks.")]
struct Cli {
    /// Configuration file (defaults to ~/.config/revoice/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Listen address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Convert a local video file
    Convert {
        /// Input video file
        input: PathBuf,

        /// Output video file (defaults to <input>_converted.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Target voice: female, or anything else for the default male voice
        #[arg(long, default_value = "female")]
        voice: String,

        /// Number of chunks converted at once (overrides config)
        #[arg(short, long)]
        concurrency: Option<usize>,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn derive_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default();
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mp4".to_string());
    let mut output = input.to_path_buf();
    output.set_file_name(format!("{}_converted.{}", stem.to_string_lossy(), ext));
    output
}

/// Warn early about a broken deployment instead of failing the first request.
async fn check_environment(config: &Config, pipeline: &Pipeline) {
    if let Err(e) = Ffmpeg::new().check_binaries().await {
        warn!("{}", e);
    }
    match RvcConverter::new(&config.inference) {
        Ok(converter) => {
            if let Err(e) = converter.check_assets(pipeline.catalog()) {
                warn!("{}", e);
            }
        }
        Err(e) => warn!("{}", e),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn serve(mut config: Config, bind: Option<String>) -> Result<()> {
    if let Some(bind) = bind {
        config.bind = bind;
    }

    let pipeline = Arc::new(Pipeline::from_config(&config).context("Invalid configuration")?);
    check_environment(&config, &pipeline).await;

    info!(
        "Chunk length {:.0}s, concurrency {}, device {}",
        config.max_chunk_secs, config.concurrency, config.inference.device
    );

    let state = Arc::new(AppState::new(pipeline, &config));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("Listening on {}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    Ok(())
}

async fn convert(
    mut config: Config,
    input: PathBuf,
    output: Option<PathBuf>,
    voice: String,
    concurrency: Option<usize>,
) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    if let Some(c) = concurrency {
        config.concurrency = c;
    }

    let output = output.unwrap_or_else(|| derive_output_path(&input));
    let pipeline = Pipeline::from_config(&config)
        .context("Invalid configuration")?
        .with_progress(true);

    info!("Input:  {}", input.display());
    info!("Output: {}", output.display());
    info!("Voice:  {}", pipeline.catalog().lookup(Some(&voice)).voice);

    let result = pipeline
        .convert_file(&input, &output, Some(&voice))
        .await
        .context("Voice conversion failed")?;

    print_summary(&result);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Serve { bind } => serve(config, bind).await,
        Command::Convert {
            input,
            output,
            voice,
            concurrency,
        } => convert(config, input, output, voice, concurrency).await,
    }
}
