use crate::cli::{RelayArgs, ServeArgs, SniffArgs};
use crate::transcode::{HlsSettings, RtpSettings, TRACK_ID_PLACEHOLDER};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_media_template")]
    pub media_template: String,

    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    #[serde(default = "default_playlist")]
    pub playlist: String,

    #[serde(default = "default_segment_seconds")]
    pub segment_seconds: f64,

    #[serde(default = "default_list_size")]
    pub list_size: u32,

    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: f64,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    #[serde(default = "default_ffmpeg_bin")]
    pub ffmpeg_bin: String,

    #[serde(default = "default_timeout_secs")]
    pub fetch_timeout_secs: f64,

    #[serde(default = "default_timeout_secs")]
    pub grace_period_secs: f64,

    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    #[serde(default = "default_player_url")]
    pub player_url: String,

    #[serde(default)]
    pub stream_url: Option<String>,

    #[serde(default = "default_target_rtp")]
    pub target_rtp: String,

    #[serde(default = "default_payload_type")]
    pub payload_type: u8,

    #[serde(default = "default_sdp_file")]
    pub sdp_file: PathBuf,

    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,
}

fn default_api_url() -> String {
    "https://swarmfm.boopdev.com/v2/player".to_string()
}

fn default_media_template() -> String {
    "https://swarmfm.boopdev.com/assets/music/{id}.mp3".to_string()
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("hls_out")
}

fn default_playlist() -> String {
    "live.m3u8".to_string()
}

fn default_segment_seconds() -> f64 {
    6.0
}

fn default_list_size() -> u32 {
    8
}

fn default_poll_seconds() -> f64 {
    1.0
}

fn default_http_port() -> u16 {
    8080
}

fn default_ffmpeg_bin() -> String {
    "ffmpeg".to_string()
}

fn default_timeout_secs() -> f64 {
    5.0
}

fn default_player_url() -> String {
    "https://player.sw.arm.fm/".to_string()
}

fn default_target_rtp() -> String {
    "rtp://239.69.0.1:5004".to_string()
}

fn default_payload_type() -> u8 {
    96
}

fn default_sdp_file() -> PathBuf {
    PathBuf::from("aes67.sdp")
}

fn default_wait_ms() -> u64 {
    12000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            media_template: default_media_template(),
            out_dir: default_out_dir(),
            playlist: default_playlist(),
            segment_seconds: default_segment_seconds(),
            list_size: default_list_size(),
            poll_seconds: default_poll_seconds(),
            http_port: default_http_port(),
            ffmpeg_bin: default_ffmpeg_bin(),
            fetch_timeout_secs: default_timeout_secs(),
            grace_period_secs: default_timeout_secs(),
            relay: RelayConfig::default(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            player_url: default_player_url(),
            stream_url: None,
            target_rtp: default_target_rtp(),
            payload_type: default_payload_type(),
            sdp_file: default_sdp_file(),
            wait_ms: default_wait_ms(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location
    /// (~/.config/hls-mirror/config.json) when no path is given
    ///
    /// A missing file at the default location means built-in defaults; a
    /// missing explicit path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {:?}", path);
                }
                path.to_path_buf()
            }
            None => match Self::config_path() {
                Some(path) if path.exists() => path,
                _ => {
                    tracing::debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        tracing::info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    /// Get the path to the configuration file
    fn config_path() -> Option<PathBuf> {
        let config_dir = if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(dir)
        } else {
            PathBuf::from(std::env::var("HOME").ok()?).join(".config")
        };

        Some(config_dir.join("hls-mirror").join("config.json"))
    }

    pub fn apply_serve_args(&mut self, args: &ServeArgs) {
        if let Some(v) = &args.api_url {
            self.api_url = v.clone();
        }
        if let Some(v) = &args.media_template {
            self.media_template = v.clone();
        }
        if let Some(v) = &args.out_dir {
            self.out_dir = v.clone();
        }
        if let Some(v) = &args.playlist {
            self.playlist = v.clone();
        }
        if let Some(v) = args.segment_seconds {
            self.segment_seconds = v;
        }
        if let Some(v) = args.list_size {
            self.list_size = v;
        }
        if let Some(v) = args.poll_seconds {
            self.poll_seconds = v;
        }
        if let Some(v) = args.http_port {
            self.http_port = v;
        }
        if let Some(v) = &args.ffmpeg_bin {
            self.ffmpeg_bin = v.clone();
        }
    }

    pub fn apply_sniff_args(&mut self, args: &SniffArgs) {
        if let Some(v) = &args.player_url {
            self.relay.player_url = v.clone();
        }
        if let Some(v) = args.wait_ms {
            self.relay.wait_ms = v;
        }
    }

    pub fn apply_relay_args(&mut self, args: &RelayArgs) {
        if let Some(v) = &args.player_url {
            self.relay.player_url = v.clone();
        }
        if let Some(v) = &args.stream_url {
            self.relay.stream_url = Some(v.clone());
        }
        if let Some(v) = &args.target_rtp {
            self.relay.target_rtp = v.clone();
        }
        if let Some(v) = args.payload_type {
            self.relay.payload_type = v;
        }
        if let Some(v) = &args.sdp_file {
            self.relay.sdp_file = v.clone();
        }
        if let Some(v) = args.wait_ms {
            self.relay.wait_ms = v;
        }
        if let Some(v) = &args.ffmpeg_bin {
            self.ffmpeg_bin = v.clone();
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_url.is_empty() {
            return Err(anyhow::anyhow!("api_url cannot be empty"));
        }

        if !self.media_template.contains(TRACK_ID_PLACEHOLDER) {
            return Err(anyhow::anyhow!(
                "media_template must contain {}",
                TRACK_ID_PLACEHOLDER
            ));
        }

        if self.playlist.is_empty() {
            return Err(anyhow::anyhow!("playlist cannot be empty"));
        }

        for (name, value) in [
            ("segment_seconds", self.segment_seconds),
            ("poll_seconds", self.poll_seconds),
            ("fetch_timeout_secs", self.fetch_timeout_secs),
            ("grace_period_secs", self.grace_period_secs),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(anyhow::anyhow!("{} must be a positive number", name));
            }
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(anyhow::anyhow!("{} is too large: {}", name, value));
            }
        }

        if self.list_size == 0 {
            return Err(anyhow::anyhow!("list_size must be at least 1"));
        }

        if self.http_port == 0 {
            return Err(anyhow::anyhow!("http_port cannot be 0"));
        }

        if self.ffmpeg_bin.is_empty() {
            return Err(anyhow::anyhow!("ffmpeg_bin cannot be empty"));
        }

        if !self.relay.target_rtp.starts_with("rtp://") {
            return Err(anyhow::anyhow!("target_rtp must be an rtp:// URL"));
        }

        Ok(())
    }

    pub fn hls_settings(&self) -> HlsSettings {
        HlsSettings {
            out_dir: self.out_dir.clone(),
            playlist: self.playlist.clone(),
            segment_seconds: self.segment_seconds,
            list_size: self.list_size,
        }
    }

    pub fn rtp_settings(&self) -> RtpSettings {
        RtpSettings {
            target: self.relay.target_rtp.clone(),
            sdp_file: self.relay.sdp_file.clone(),
            payload_type: self.relay.payload_type,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.fetch_timeout_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs_f64(self.grace_period_secs)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.relay.wait_ms)
    }
}
