//! The server's configuration surface: a `clap`-derived CLI plus the
//! environment-variable knobs the CLI doesn't cover (worker thread count,
//! a debug dump path, and default codec quality/speed).

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

const DEFAULT_WORKER_THREADS: usize = 2;
const DEFAULT_CODEC_QUALITY: u8 = 80;
const DEFAULT_CODEC_SPEED: u8 = 50;

#[derive(Parser, Debug, Clone)]
#[command(name = "rdsp-server")]
#[command(about = "Remote display session core: transport, hello negotiation, and subsystem dispatch")]
pub struct Args {
    /// Listen for TCP connections on this address.
    #[arg(long, value_name = "ADDR")]
    pub bind_tcp: Option<SocketAddr>,

    /// Listen for Unix domain socket connections at this path.
    #[arg(long, value_name = "PATH")]
    pub bind_unix: Option<PathBuf>,

    /// Listen for AF_VSOCK connections, given as `CID:PORT`.
    #[arg(long, value_name = "CID:PORT")]
    pub bind_vsock: Option<String>,

    /// Listen for WebSocket connections on this address.
    #[arg(long, value_name = "ADDR")]
    pub bind_ws: Option<SocketAddr>,

    /// Path to a file to use for the shared-memory pixel fast path.
    #[arg(long, value_name = "PATH")]
    pub mmap: Option<PathBuf>,

    /// Encryption spec, e.g. `aes256-pbkdf2`. Omit to run without transport
    /// encryption (only appropriate for already-secured channels, e.g. a
    /// Unix socket or an externally tunneled vsock).
    #[arg(long, value_name = "SPEC")]
    pub encryption: Option<String>,

    /// Comma-separated list of acceptable compressors, in preference order.
    #[arg(long, value_name = "LIST", default_value = "lz4,zlib", value_delimiter = ',')]
    pub compressors: Vec<String>,

    /// Which packet argument encoder new connections must use.
    #[arg(long, value_name = "ENCODER", default_value = "modern")]
    pub packet_encoder: PacketEncoderChoice,

    /// Caps outbound bytes per second per connection. Unset means
    /// unlimited.
    #[arg(long, value_name = "BPS")]
    pub bandwidth_limit: Option<u64>,

    /// Authentication scheme required at hello time. Omit to accept
    /// connections without a challenge.
    #[arg(long, value_name = "SCHEME")]
    pub auth: Option<String>,

    /// Increase tracing verbosity; repeatable (`-vv`, `-vvv`).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PacketEncoderChoice {
    Modern,
    Legacy,
}

/// Environment-derived knobs that have no corresponding CLI flag: they
/// tune the worker pool and codec defaults rather than the listening
/// surface, and are expected to come from deployment configuration rather
/// than a command line.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub worker_threads: usize,
    pub save_debug_path: Option<PathBuf>,
    pub codec_quality: u8,
    pub codec_speed: u8,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            worker_threads: read_env_usize("RDSP_WORKER_THREADS", DEFAULT_WORKER_THREADS),
            save_debug_path: std::env::var_os("RDSP_SAVE_DEBUG_PATH").map(PathBuf::from),
            codec_quality: read_env_u8("RDSP_CODEC_QUALITY", DEFAULT_CODEC_QUALITY),
            codec_speed: read_env_u8("RDSP_CODEC_SPEED", DEFAULT_CODEC_SPEED),
        }
    }
}

fn read_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn read_env_u8(key: &str, default: u8) -> u8 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Full configuration a [`crate::runtime::Runtime`] is built from: the
/// parsed CLI plus the environment overlay.
#[derive(Debug, Clone)]
pub struct Config {
    pub args: Args,
    pub env: EnvConfig,
}

impl Config {
    pub fn load() -> Self {
        Self { args: Args::parse(), env: EnvConfig::from_env() }
    }

    pub fn tracing_filter(&self) -> String {
        match self.args.verbose {
            0 => "info".to_string(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    }
}
