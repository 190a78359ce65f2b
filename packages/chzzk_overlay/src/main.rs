use anyhow::{Context, Result};
use clap::Parser;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use chzzk_chat::{ChatPipeline, PipelineHandle};

mod api;
mod config;
mod render;

use crate::api::ChzzkApi;
use crate::config::{FileConfig, OutputFormat, OverlayPaths};
use crate::render::Renderer;

#[derive(Parser)]
#[command(name = "chzzk-overlay")]
#[command(about = "Stream a Chzzk channel's live chat to the terminal")]
struct Cli {
    /// Public channel id (the hex id in the channel URL)
    #[arg(required_unless_present = "print_config")]
    channel_id: Option<String>,

    /// Directory holding config.toml (defaults to the user config dir)
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Maximum number of chats kept visible
    #[arg(long)]
    max_visible: Option<usize>,

    /// Output format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging (stdout is reserved for chat output)
    let default_directive = if cli.debug {
        "chzzk_overlay=debug,chzzk_chat=debug,info"
    } else {
        "chzzk_overlay=info,chzzk_chat=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let paths = OverlayPaths::new(cli.config_dir.clone())?;
    let mut file_config: FileConfig = config::load_config(&paths.config_dir)
        .extract()
        .with_context(|| format!("invalid configuration in {:?}", paths.config_toml_path()))?;
    if let Some(max_visible) = cli.max_visible {
        file_config.chat.max_visible = max_visible;
    }
    if let Some(format) = cli.format {
        file_config.display.format = format;
    }

    if cli.print_config {
        print!("{}", toml::to_string_pretty(&file_config)?);
        return Ok(());
    }
    let Some(channel_id) = cli.channel_id else {
        anyhow::bail!("a channel id is required");
    };

    let api = ChzzkApi::new(&file_config.api).context("failed to build HTTP client")?;
    let credentials = match api.resolve(&channel_id).await {
        Ok(credentials) => credentials,
        Err(e) if e.is_fatal() => {
            tracing::error!(error = %e, "cannot start chat overlay");
            std::process::exit(1);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to resolve chat credentials for {channel_id}"));
        }
    };

    info!(%channel_id, "starting chat overlay");
    let pipeline = ChatPipeline::spawn(file_config.pipeline_config(), credentials);
    let renderer = Renderer::new(file_config.display.format, std::io::stdout().is_terminal());

    let result = run(&pipeline, renderer, &api, &channel_id, file_config.stats_interval()).await;

    info!(metrics = ?pipeline.metrics().snapshot(), "final pipeline metrics");
    pipeline.shutdown().await;
    result
}

async fn run(
    pipeline: &PipelineHandle,
    mut renderer: Renderer,
    api: &ChzzkApi,
    channel_id: &str,
    stats_interval: Option<Duration>,
) -> Result<()> {
    let mut visible = pipeline.visible();
    let mut state = pipeline.connection_state();
    let mut restart = RestartSignal::new()?;
    let mut stats = stats_interval.map(|period| {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                return Ok(());
            }

            changed = visible.changed() => {
                if changed.is_err() {
                    warn!("chat pipeline ended");
                    return Ok(());
                }
                let chats = visible.borrow_and_update().clone();
                let mut stdout = std::io::stdout().lock();
                for line in renderer.update(&chats)? {
                    writeln!(stdout, "{line}")?;
                }
                stdout.flush()?;
            }

            changed = state.changed() => {
                if changed.is_ok() {
                    info!(state = ?*state.borrow_and_update(), "connection state");
                }
            }

            _ = restart.recv() => {
                info!(%channel_id, "restart requested, re-resolving credentials");
                match api.resolve(channel_id).await {
                    Ok(credentials) => pipeline.restart(Some(credentials)),
                    Err(e) => {
                        warn!(error = %e, "credential refresh failed, restarting with previous credentials");
                        pipeline.restart(None);
                    }
                }
            }

            _ = next_tick(&mut stats) => {
                let snapshot = pipeline.metrics().snapshot();
                info!(
                    frames = snapshot.frames.received,
                    accepted = snapshot.records.accepted,
                    hidden = snapshot.records.hidden,
                    failed = snapshot.records.failed,
                    reconnects = snapshot.connection.reconnects_scheduled,
                    "pipeline stats"
                );
            }
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// SIGHUP on unix; never fires elsewhere.
#[cfg(unix)]
struct RestartSignal(tokio::signal::unix::Signal);

#[cfg(unix)]
impl RestartSignal {
    fn new() -> Result<Self> {
        let signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
            .context("failed to install SIGHUP handler")?;
        Ok(Self(signal))
    }

    async fn recv(&mut self) -> Option<()> {
        self.0.recv().await
    }
}

#[cfg(not(unix))]
struct RestartSignal;

#[cfg(not(unix))]
impl RestartSignal {
    fn new() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> Option<()> {
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn channel_id_required_unless_printing_config() {
        assert!(Cli::try_parse_from(["chzzk-overlay"]).is_err());

        let cli = Cli::try_parse_from(["chzzk-overlay", "--print-config"]).unwrap();
        assert!(cli.print_config);
        assert!(cli.channel_id.is_none());
    }

    #[test]
    fn overrides_parse() {
        let cli = Cli::try_parse_from([
            "chzzk-overlay",
            "abc123",
            "--max-visible",
            "20",
            "--format",
            "json",
            "-d",
        ])
        .unwrap();
        assert_eq!(cli.channel_id.as_deref(), Some("abc123"));
        assert_eq!(cli.max_visible, Some(20));
        assert_eq!(cli.format, Some(OutputFormat::Json));
        assert!(cli.debug);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_stats_never_tick() {
        let mut stats: Option<Interval> = None;
        let fired = tokio::time::timeout(Duration::from_secs(3600), next_tick(&mut stats)).await;
        assert!(fired.is_err());
    }
}
