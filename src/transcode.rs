use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};

/// Placeholder replaced by the track identity in the media template
pub const TRACK_ID_PLACEHOLDER: &str = "{id}";

/// Build the media source locator for a track
pub fn media_url(template: &str, track_id: &str) -> String {
    template.replace(TRACK_ID_PLACEHOLDER, track_id)
}

/// HLS output parameters
#[derive(Debug, Clone, PartialEq)]
pub struct HlsSettings {
    pub out_dir: PathBuf,
    pub playlist: String,
    pub segment_seconds: f64,
    pub list_size: u32,
}

/// RTP output parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RtpSettings {
    pub target: String,
    pub sdp_file: PathBuf,
    pub payload_type: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sink {
    Hls(HlsSettings),
    Rtp(RtpSettings),
}

/// A single transcode job: where to read from, where to seek, where to write
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeJob {
    pub source: String,
    pub start_offset: f64,
    /// Live sources are read from their current edge and never seeked
    pub live: bool,
    pub sink: Sink,
}

impl TranscodeJob {
    pub fn hls(source: String, start_offset: f64, settings: &HlsSettings) -> Self {
        Self {
            source,
            start_offset: start_offset.max(0.0),
            live: false,
            sink: Sink::Hls(settings.clone()),
        }
    }

    pub fn rtp(source: String, settings: &RtpSettings) -> Self {
        Self {
            source,
            start_offset: 0.0,
            live: true,
            sink: Sink::Rtp(settings.clone()),
        }
    }

    /// Argument vector for the transcode binary (program name excluded)
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "-reconnect",
            "1",
            "-reconnect_streamed",
            "1",
            "-reconnect_delay_max",
            "2",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if !self.live {
            args.push("-ss".into());
            args.push(self.start_offset.to_string());
        }
        args.push("-i".into());
        args.push(self.source.clone());
        args.push("-vn".into());

        match &self.sink {
            Sink::Hls(hls) => {
                let playlist = hls.out_dir.join(&hls.playlist);
                args.extend(
                    [
                        "-c:a",
                        "aac",
                        "-b:a",
                        "192k",
                        "-ar",
                        "48000",
                        "-ac",
                        "2",
                        "-f",
                        "hls",
                        "-hls_time",
                    ]
                    .iter()
                    .map(|s| s.to_string()),
                );
                args.push(hls.segment_seconds.to_string());
                args.push("-hls_list_size".into());
                args.push(hls.list_size.to_string());
                args.push("-hls_flags".into());
                args.push("delete_segments+omit_endlist".into());
                args.push(playlist.to_string_lossy().into_owned());
            }
            Sink::Rtp(rtp) => {
                args.extend(
                    [
                        "-ar",
                        "48000",
                        "-ac",
                        "2",
                        "-sample_fmt",
                        "s24",
                        "-c:a",
                        "pcm_s24be",
                        "-payload_type",
                    ]
                    .iter()
                    .map(|s| s.to_string()),
                );
                args.push(rtp.payload_type.to_string());
                args.push("-f".into());
                args.push("rtp".into());
                args.push(rtp.target.clone());
                args.push("-sdp_file".into());
                args.push(rtp.sdp_file.to_string_lossy().into_owned());
            }
        }

        args
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("{program} not found; install it or set FFMPEG_BIN")]
    NotFound { program: String },

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Handle on a running transcode process
#[async_trait]
pub trait ProcessHandle: Send {
    /// Ask the process to exit (SIGTERM on unix)
    fn terminate(&mut self) -> io::Result<()>;

    fn kill(&mut self) -> io::Result<()>;

    /// Wait for the process to exit
    async fn wait(&mut self) -> io::Result<ExitStatus>;

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;
}

/// Starts transcode processes for jobs
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, job: &TranscodeJob) -> Result<Box<dyn ProcessHandle>, LaunchError>;
}

/// Launches jobs with an ffmpeg binary
pub struct FfmpegLauncher {
    program: String,
}

impl FfmpegLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ProcessLauncher for FfmpegLauncher {
    fn launch(&self, job: &TranscodeJob) -> Result<Box<dyn ProcessHandle>, LaunchError> {
        let args = job.args();
        tracing::info!("Starting transcode: {} {}", self.program, args.join(" "));

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => LaunchError::NotFound {
                    program: self.program.clone(),
                },
                _ => LaunchError::Spawn {
                    program: self.program.clone(),
                    source: e,
                },
            })?;

        Ok(Box::new(ChildHandle::new(child)))
    }
}

pub struct ChildHandle {
    child: Child,
}

impl ChildHandle {
    pub fn new(child: Child) -> Self {
        Self { child }
    }
}

#[async_trait]
impl ProcessHandle for ChildHandle {
    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        // None once the child has been reaped
        let Some(pid) = self.child.id() else {
            return Ok(());
        };

        // SAFETY: pid refers to our own child, which has not been reaped yet.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }
}
