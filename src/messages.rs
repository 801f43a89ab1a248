use std::process::ExitStatus;
use tokio::sync::oneshot;

use crate::services::SupervisorError;
use crate::transcode::TranscodeJob;

/// Commands for the Supervisor service
pub enum SupervisorCommand {
    Start {
        job: TranscodeJob,
        reply: oneshot::Sender<Result<(), SupervisorError>>,
    },
    Stop(oneshot::Sender<()>),
    Status(oneshot::Sender<ProcessStatus>),
}

/// Poll loop state (observable via watch channel)
#[derive(Clone, Debug, PartialEq)]
pub enum PollState {
    Idle,
    Resyncing,
    Stopped,
}

/// What the supervisor knows about its current transcode process
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProcessStatus {
    Idle,
    Running,
    Exited(ExitStatus),
}
