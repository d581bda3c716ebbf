//! chessreview - evaluate a game with a local UCI engine and fetch its review.
//!
//! Reads the position list produced by the move-list parser, searches every
//! position with one engine session, submits the evaluations to the reporting
//! service and prints the returned report as JSON on stdout.
//!
//! Every flag falls back to a `CHESSREVIEW_*` environment variable (see
//! [`review::config`]) and then to a built-in default.

mod input;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use engine::ProcessWorkerFactory;
use review::{ReportClient, ReviewConfig, ReviewPipeline};

#[derive(Parser)]
#[command(name = "chessreview", about = "Engine evaluation and game review")]
struct Cli {
    /// JSON position list, or `-` for stdin.
    positions: PathBuf,

    /// Path to the UCI engine binary.
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Search depth for every position.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..))]
    depth: Option<u8>,

    /// Reporting service endpoint.
    #[arg(long)]
    report_url: Option<String>,

    /// Per-position search timeout in seconds.
    #[arg(long)]
    search_timeout: Option<u64>,

    /// Whether the game ended on the board. `auto` checks the final position.
    #[arg(long, value_enum, default_value_t = GameOver::Auto)]
    game_over: GameOver,

    /// Print the evaluations instead of submitting them.
    #[arg(long)]
    evaluations_only: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum GameOver {
    Auto,
    Yes,
    No,
}

impl Cli {
    fn apply_to(&self, config: &mut ReviewConfig) {
        if let Some(path) = &self.engine {
            config.engine_path = Some(path.clone());
        }
        if let Some(depth) = self.depth {
            config.search_depth = depth;
        }
        if let Some(url) = &self.report_url {
            config.report_url = url.clone();
        }
        if let Some(secs) = self.search_timeout {
            config.search_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
    }
}

/// The configured engine, or the first one found in the usual locations.
async fn resolve_engine_path(config: &ReviewConfig) -> anyhow::Result<PathBuf> {
    if let Some(path) = &config.engine_path {
        return Ok(path.clone());
    }
    // The search runs each candidate binary, so keep it off the runtime threads
    tokio::task::spawn_blocking(engine::find_engine_path)
        .await?
        .context("no engine found; pass --engine or set CHESSREVIEW_ENGINE_PATH")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::fmt::format::FmtSpan;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ReviewConfig::from_env();
    cli.apply_to(&mut config);
    tracing::debug!(?config, "Resolved configuration");

    let positions = input::load_positions(&cli.positions)?;
    let game_concluded = match cli.game_over {
        GameOver::Auto => review::is_game_concluded(&positions),
        GameOver::Yes => true,
        GameOver::No => false,
    };
    tracing::info!(
        positions = positions.len(),
        game_concluded,
        depth = config.search_depth,
        "Starting review"
    );

    let engine_path = resolve_engine_path(&config).await?;
    tracing::info!("Using engine: {}", engine_path.display());

    let pipeline = ReviewPipeline::new(
        Arc::new(ProcessWorkerFactory::new(engine_path)),
        config.session_config(),
        config.search_depth,
    );

    if cli.evaluations_only {
        let evaluations = pipeline
            .evaluate(&positions, game_concluded)
            .await
            .context("evaluation failed")?;
        println!("{}", serde_json::to_string_pretty(&evaluations)?);
        return Ok(());
    }

    let client = ReportClient::new(&config.report_url, config.report_endpoint(), config.http_timeout)
        .context("failed to build report client")?;
    tracing::info!("Submitting to {}", client.url());

    let outcome = pipeline
        .run(&positions, game_concluded, &client)
        .await
        .context("review failed")?;

    match outcome.report {
        Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
        None => tracing::warn!("Nothing to review"),
    }

    Ok(())
}
