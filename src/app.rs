use crate::config::Config;
use crate::messages::PollState;
use crate::output_dir::OutputDirectory;
use crate::server;
use crate::services::{PollSettings, Poller, Supervisor, SupervisorHandle};
use crate::state::HttpStateSource;
use crate::transcode::FfmpegLauncher;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The HLS rebuilder: poll loop, transcode supervisor and file server
pub struct App {
    config: Config,
    output: OutputDirectory,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let output = OutputDirectory::new(&config.out_dir);
        // The server must never bind to a directory that does not exist yet
        output.ensure_exists()?;

        Ok(Self { config, output })
    }

    /// Run until `shutdown` fires or a fatal error occurs
    ///
    /// The poll loop and the HTTP server get their own child tokens so either
    /// can be stopped without the other; a failure of one stops both.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let poll_cancel = shutdown.child_token();
        let server_cancel = shutdown.child_token();

        let (supervisor, supervisor_task) = self.setup_supervisor();
        let poller = self.setup_poller(supervisor)?;

        tracing::info!(
            "Ready! Playlist at http://<host>:{}/{}",
            self.config.http_port,
            self.config.playlist
        );

        let server_task = tokio::spawn({
            let root = self.output.path().to_path_buf();
            let port = self.config.http_port;
            let server_cancel = server_cancel.clone();
            let poll_cancel = poll_cancel.clone();
            async move {
                let result = server::serve(root, port, server_cancel).await;
                if let Err(e) = &result {
                    tracing::error!("{:#}", e);
                    poll_cancel.cancel();
                }
                result
            }
        });

        let poll_result = poller.run(poll_cancel).await;
        server_cancel.cancel();

        let server_result = server_task.await.context("HTTP server task panicked")?;
        supervisor_task.await.context("Supervisor task panicked")?;

        poll_result.context("Poll loop failed")?;
        server_result?;

        tracing::info!("Shutdown complete");
        Ok(())
    }

    fn setup_supervisor(&self) -> (SupervisorHandle, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(10);
        let supervisor = Supervisor::new(
            Box::new(FfmpegLauncher::new(&self.config.ffmpeg_bin)),
            Some(self.output.clone()),
            self.config.grace_period(),
            cmd_rx,
        );
        let task = tokio::spawn(supervisor.run());

        (SupervisorHandle::new(cmd_tx), task)
    }

    fn setup_poller(&self, supervisor: SupervisorHandle) -> Result<Poller> {
        let source = HttpStateSource::new(&self.config.api_url, self.config.fetch_timeout())?;
        tracing::info!("Following player state at {}", self.config.api_url);

        let settings = PollSettings {
            interval: self.config.poll_interval(),
            media_template: self.config.media_template.clone(),
            hls: self.config.hls_settings(),
        };

        let (state_tx, mut state_rx) = watch::channel(PollState::Idle);
        tokio::spawn(async move {
            while state_rx.changed().await.is_ok() {
                tracing::debug!("Poll state: {:?}", *state_rx.borrow_and_update());
            }
        });

        Ok(Poller::new(Box::new(source), supervisor, settings, state_tx))
    }
}
