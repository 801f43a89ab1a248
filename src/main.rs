mod app;
mod cli;
mod config;
mod detector;
mod discovery;
mod messages;
mod output_dir;
mod relay;
mod server;
mod services;
mod state;
mod transcode;

#[cfg(all(test, unix))]
mod testing;

use app::App;
use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use discovery::PageDiscovery;
use relay::RelaySettings;
use transcode::FfmpegLauncher;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Load configuration
    let mut config = Config::load(cli.config.as_deref())?;

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_shutdown_signals(shutdown.clone()));

    match cli.command.unwrap_or(Commands::Serve(cli.serve)) {
        Commands::Serve(args) => {
            config.apply_serve_args(&args);
            config.validate()?;
            tracing::debug!("Effective config: {}", serde_json::to_string(&config)?);

            tracing::info!("Starting hls-mirror");
            App::new(config)?.run(shutdown).await
        }

        Commands::Sniff(args) => {
            config.apply_sniff_args(&args);
            config.validate()?;

            let discovery = PageDiscovery::new(config.discovery_timeout())?;
            relay::sniff(&discovery, &config.relay.player_url, shutdown).await
        }

        Commands::Relay(args) => {
            config.apply_relay_args(&args);
            config.validate()?;

            let discovery = PageDiscovery::new(config.discovery_timeout())?;
            let launcher = FfmpegLauncher::new(&config.ffmpeg_bin);
            let settings = RelaySettings {
                player_url: config.relay.player_url.clone(),
                stream_url: config.relay.stream_url.clone(),
                rtp: config.rtp_settings(),
                grace: config.grace_period(),
            };
            relay::run_relay(&settings, &discovery, &launcher, shutdown).await
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM
async fn watch_shutdown_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }

    shutdown.cancel();
}
