use crate::messages::{ProcessStatus, SupervisorCommand};
use crate::output_dir::OutputDirectory;
use crate::transcode::{LaunchError, ProcessHandle, ProcessLauncher, TranscodeJob};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The transcode binary cannot be started; retrying will not help
    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("supervisor is no longer running")]
    Closed,
}

/// The transcode process currently owned by the supervisor
struct SupervisedProcess {
    job: TranscodeJob,
    handle: Box<dyn ProcessHandle>,
}

/// Owns at most one transcode process at a time
///
/// This service:
/// - Stops the previous process (and waits for it to exit) before every start
/// - Clears the output directory between processes
/// - Serialises start/stop/status requests through its command channel
///
/// When every handle has been dropped the current process is stopped and the
/// service exits.
pub struct Supervisor {
    launcher: Box<dyn ProcessLauncher>,
    output: Option<OutputDirectory>,
    grace: Duration,
    cmd_rx: mpsc::Receiver<SupervisorCommand>,
    current: Option<SupervisedProcess>,
}

impl Supervisor {
    pub fn new(
        launcher: Box<dyn ProcessLauncher>,
        output: Option<OutputDirectory>,
        grace: Duration,
        cmd_rx: mpsc::Receiver<SupervisorCommand>,
    ) -> Self {
        Self {
            launcher,
            output,
            grace,
            cmd_rx,
            current: None,
        }
    }

    pub async fn run(mut self) {
        while let Some(cmd) = self.cmd_rx.recv().await {
            self.handle_command(cmd).await;
        }

        self.stop_current().await;
        tracing::debug!("Supervisor exiting");
    }

    async fn handle_command(&mut self, cmd: SupervisorCommand) {
        match cmd {
            SupervisorCommand::Start { job, reply } => {
                let result = self.start(job).await;
                let _ = reply.send(result);
            }

            SupervisorCommand::Stop(reply) => {
                self.stop_current().await;
                let _ = reply.send(());
            }

            SupervisorCommand::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    async fn start(&mut self, job: TranscodeJob) -> Result<(), SupervisorError> {
        self.stop_current().await;

        if let Some(output) = &self.output {
            let output = output.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || output.prepare()).await {
                tracing::warn!("Output directory cleanup did not complete: {}", e);
            }
        }

        let handle = self.launcher.launch(&job)?;
        tracing::debug!(
            "Transcode running for {} from {:.2}s",
            job.source,
            job.start_offset
        );
        self.current = Some(SupervisedProcess { job, handle });
        Ok(())
    }

    async fn stop_current(&mut self) {
        if let Some(mut process) = self.current.take() {
            tracing::info!("Stopping transcode for {}", process.job.source);
            shutdown_process(process.handle.as_mut(), self.grace).await;
        }
    }

    fn status(&mut self) -> ProcessStatus {
        let Some(process) = self.current.as_mut() else {
            return ProcessStatus::Idle;
        };

        match process.handle.try_wait() {
            Ok(Some(status)) => ProcessStatus::Exited(status),
            Ok(None) => ProcessStatus::Running,
            Err(e) => {
                tracing::debug!("Failed to poll transcode process: {}", e);
                ProcessStatus::Running
            }
        }
    }
}

/// Terminate a process, escalating to a kill after `grace`
///
/// Returns only once the process has exited.
pub async fn shutdown_process(handle: &mut dyn ProcessHandle, grace: Duration) {
    if let Ok(Some(status)) = handle.try_wait() {
        tracing::debug!("Transcode already exited ({})", status);
        return;
    }

    if let Err(e) = handle.terminate() {
        tracing::warn!("Failed to send terminate to transcode: {}", e);
    }

    match tokio::time::timeout(grace, handle.wait()).await {
        Ok(Ok(status)) => {
            tracing::debug!("Transcode exited ({})", status);
            return;
        }
        Ok(Err(e)) => tracing::warn!("Failed to wait for transcode: {}", e),
        Err(_) => tracing::warn!(
            "Transcode did not exit within {:?}, killing it",
            grace
        ),
    }

    if let Err(e) = handle.kill() {
        tracing::warn!("Failed to kill transcode: {}", e);
    }
    match handle.wait().await {
        Ok(status) => tracing::debug!("Transcode killed ({})", status),
        Err(e) => tracing::error!("Failed to reap killed transcode: {}", e),
    }
}

/// Handle for communicating with the Supervisor
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<SupervisorCommand>,
}

impl SupervisorHandle {
    pub fn new(tx: mpsc::Sender<SupervisorCommand>) -> Self {
        Self { tx }
    }

    /// Replace whatever is running with `job`
    pub async fn start(&self, job: TranscodeJob) -> Result<(), SupervisorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SupervisorCommand::Start { job, reply })
            .await
            .map_err(|_| SupervisorError::Closed)?;

        rx.await.map_err(|_| SupervisorError::Closed)?
    }

    /// Stop the current process; returns once it has exited
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SupervisorCommand::Stop(reply))
            .await
            .map_err(|_| SupervisorError::Closed)?;

        rx.await.map_err(|_| SupervisorError::Closed)
    }

    pub async fn status(&self) -> Result<ProcessStatus, SupervisorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SupervisorCommand::Status(reply))
            .await
            .map_err(|_| SupervisorError::Closed)?;

        rx.await.map_err(|_| SupervisorError::Closed)
    }
}
