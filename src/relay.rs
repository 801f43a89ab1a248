use crate::discovery::StreamDiscovery;
use crate::services::shutdown_process;
use crate::transcode::{ProcessLauncher, RtpSettings, TranscodeJob};
use anyhow::{Context, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct RelaySettings {
    pub player_url: String,
    pub stream_url: Option<String>,
    pub rtp: RtpSettings,
    pub grace: Duration,
}

/// Print the candidates found on the player page, most likely first
pub async fn sniff(
    discovery: &dyn StreamDiscovery,
    player_url: &str,
    cancel: CancellationToken,
) -> Result<()> {
    let urls = tokio::select! {
        urls = discovery.discover(player_url) => urls?,
        _ = cancel.cancelled() => {
            tracing::info!("Discovery cancelled");
            return Ok(());
        }
    };
    if urls.is_empty() {
        println!("No likely stream URLs detected.");
    } else {
        println!("Likely stream URLs (most likely first):");
        for url in urls {
            println!("{}", url);
        }
    }
    Ok(())
}

/// Pick the first discovered candidate
pub fn select_candidate(found: Vec<String>) -> Result<String> {
    let mut found = found.into_iter();
    let selected = found.next().context(
        "No candidate stream URLs were detected; pass --stream-url manually as a fallback",
    )?;

    tracing::info!("Selected stream URL: {}", selected);
    let others: Vec<String> = found.collect();
    if !others.is_empty() {
        tracing::info!("Other candidates:\n  {}", others.join("\n  "));
    }
    Ok(selected)
}

/// Restream the live feed over RTP until the transcode exits or `cancel` fires
pub async fn run_relay(
    settings: &RelaySettings,
    discovery: &dyn StreamDiscovery,
    launcher: &dyn ProcessLauncher,
    cancel: CancellationToken,
) -> Result<()> {
    let stream_url = match &settings.stream_url {
        Some(url) => url.clone(),
        None => {
            let found = tokio::select! {
                found = discovery.discover(&settings.player_url) => found?,
                _ = cancel.cancelled() => {
                    tracing::info!("Discovery cancelled, not starting relay");
                    return Ok(());
                }
            };
            select_candidate(found)?
        }
    };

    // Discovery may have finished in the same instant shutdown was requested
    if cancel.is_cancelled() {
        tracing::info!("Shutdown requested, not starting relay");
        return Ok(());
    }

    let job = TranscodeJob::rtp(stream_url, &settings.rtp);
    let mut handle = launcher.launch(&job)?;
    tracing::info!(
        "Relaying to {} (SDP: {:?})",
        settings.rtp.target,
        settings.rtp.sdp_file
    );

    let exited = tokio::select! {
        status = handle.wait() => Some(status),
        _ = cancel.cancelled() => None,
    };

    match exited {
        Some(status) => {
            let status = status.context("Failed to wait for transcode")?;
            if !status.success() {
                anyhow::bail!("Transcode exited with {}", status);
            }
            tracing::info!("Transcode exited cleanly");
        }
        None => {
            tracing::info!("Stopping relay transcode");
            shutdown_process(handle.as_mut(), settings.grace).await;
        }
    }

    Ok(())
}
