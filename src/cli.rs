use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Mirror a remote now-playing feed into a locally served HLS stream
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Follow the player API and serve the rebuilt HLS stream (default)
    Serve(ServeArgs),
    /// Print stream URLs discovered on the player page
    Sniff(SniffArgs),
    /// Restream the live feed to an RTP endpoint
    Relay(RelayArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Player state endpoint
    #[arg(long, env = "SWARMFM_API_URL")]
    pub api_url: Option<String>,

    /// Media URL template; {id} is replaced by the track id
    #[arg(long, env = "SWARMFM_MEDIA_TEMPLATE")]
    pub media_template: Option<String>,

    /// Directory holding the playlist and segments
    #[arg(long, env = "SWARMFM_HLS_DIR")]
    pub out_dir: Option<PathBuf>,

    #[arg(long, env = "SWARMFM_HLS_PLAYLIST")]
    pub playlist: Option<String>,

    #[arg(long, env = "SWARMFM_HLS_SEGMENT_SECONDS")]
    pub segment_seconds: Option<f64>,

    /// Number of segments kept in the playlist
    #[arg(long)]
    pub list_size: Option<u32>,

    #[arg(long, env = "SWARMFM_API_POLL_SECONDS")]
    pub poll_seconds: Option<f64>,

    #[arg(long, env = "SWARMFM_HLS_HTTP_PORT")]
    pub http_port: Option<u16>,

    #[arg(long, env = "FFMPEG_BIN")]
    pub ffmpeg_bin: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct SniffArgs {
    #[arg(long, env = "SWARMFM_PLAYER_URL")]
    pub player_url: Option<String>,

    /// How long to wait for the player page
    #[arg(long)]
    pub wait_ms: Option<u64>,
}

#[derive(Args, Debug, Default)]
pub struct RelayArgs {
    #[arg(long, env = "SWARMFM_PLAYER_URL")]
    pub player_url: Option<String>,

    /// Skip discovery and relay this URL
    #[arg(long, env = "SWARMFM_STREAM_URL")]
    pub stream_url: Option<String>,

    /// rtp://host:port (can be multicast)
    #[arg(long, env = "AES67_RTP_TARGET")]
    pub target_rtp: Option<String>,

    /// RTP payload type to announce in the SDP
    #[arg(long, env = "AES67_PAYLOAD_TYPE")]
    pub payload_type: Option<u8>,

    /// Where to write the SDP for receivers
    #[arg(long, env = "AES67_SDP_FILE")]
    pub sdp_file: Option<PathBuf>,

    #[arg(long)]
    pub wait_ms: Option<u64>,

    #[arg(long, env = "FFMPEG_BIN")]
    pub ffmpeg_bin: Option<String>,
}
