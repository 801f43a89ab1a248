use crate::state::{RemoteState, StateSource};
use crate::transcode::{
    HlsSettings, LaunchError, ProcessHandle, ProcessLauncher, TranscodeJob,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Fetch,
    Launch(String, f64),
    Terminate,
    Kill,
    Exited,
}

#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    RunUntilTerminated,
    IgnoreTerminate,
    ExitImmediately(i32),
    NotFound,
}

pub struct FakeLauncher {
    behavior: Behavior,
    events: EventLog,
}

impl FakeLauncher {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            events: EventLog::default(),
        }
    }

    pub fn events(&self) -> EventLog {
        self.events.clone()
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, job: &TranscodeJob) -> Result<Box<dyn ProcessHandle>, LaunchError> {
        if let Behavior::NotFound = self.behavior {
            return Err(LaunchError::NotFound {
                program: "fake-ffmpeg".to_string(),
            });
        }

        self.events
            .push(Event::Launch(job.source.clone(), job.start_offset));

        let exit_code = match self.behavior {
            Behavior::ExitImmediately(code) => Some(code),
            _ => None,
        };
        Ok(Box::new(FakeHandle {
            behavior: self.behavior,
            events: self.events.clone(),
            exit_code,
        }))
    }
}

struct FakeHandle {
    behavior: Behavior,
    events: EventLog,
    exit_code: Option<i32>,
}

impl FakeHandle {
    fn status(code: i32) -> ExitStatus {
        ExitStatus::from_raw(code << 8)
    }
}

#[async_trait]
impl ProcessHandle for FakeHandle {
    fn terminate(&mut self) -> io::Result<()> {
        self.events.push(Event::Terminate);
        if !matches!(self.behavior, Behavior::IgnoreTerminate) {
            self.exit_code = Some(0);
        }
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.events.push(Event::Kill);
        self.exit_code = Some(137);
        Ok(())
    }

    async fn wait(&mut self) -> io::Result<ExitStatus> {
        match self.exit_code {
            Some(code) => {
                self.events.push(Event::Exited);
                Ok(Self::status(code))
            }
            None => std::future::pending().await,
        }
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        Ok(self.exit_code.map(Self::status))
    }
}

/// Replays a fixed sequence of fetch results, then reports unavailable
pub struct ScriptedSource {
    script: Mutex<VecDeque<Option<RemoteState>>>,
    log: Option<EventLog>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Option<RemoteState>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            log: None,
        }
    }

    /// Record every fetch in `log`, interleaved with process events
    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = Some(log);
        self
    }
}

#[async_trait]
impl StateSource for ScriptedSource {
    async fn fetch(&self) -> Option<RemoteState> {
        if let Some(log) = &self.log {
            log.push(Event::Fetch);
        }
        self.script.lock().unwrap().pop_front().flatten()
    }
}

pub fn remote(id: &str, position: f64) -> Option<RemoteState> {
    Some(RemoteState {
        track_id: id.to_string(),
        position_seconds: position,
    })
}

pub fn hls_settings() -> HlsSettings {
    HlsSettings {
        out_dir: PathBuf::from("hls_out"),
        playlist: "live.m3u8".to_string(),
        segment_seconds: 6.0,
        list_size: 8,
    }
}

pub fn hls_job(source: &str, offset: f64) -> TranscodeJob {
    TranscodeJob::hls(source.to_string(), offset, &hls_settings())
}
