use clap::Parser;
use core::time::Duration;
use keyspan_core::proto::DEFAULT_MAX_FRAME_BYTES;

/// Runtime configuration for the `keyspan-worker` binary.
///
/// Every value can be given as a CLI flag or an environment variable (also
/// read from a `.env` file).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "keyspan-worker",
    version,
    about = "Tests keyspace jobs handed out by a keyspan coordinator"
)]
pub struct CliArgs {
    /// Coordinator host.
    ///
    /// Environment variable: `KEYSPAN_HOST`
    #[arg(long, env = "KEYSPAN_HOST", default_value_t = String::from("127.0.0.1"))]
    pub host: String,

    /// Coordinator port.
    ///
    /// Environment variable: `KEYSPAN_PORT`
    #[arg(short, long, env = "KEYSPAN_PORT", default_value_t = 29100)]
    pub port: u16,

    /// Connection attempts before giving up.
    ///
    /// Environment variable: `KEYSPAN_ATTEMPTS`
    #[arg(short, long, env = "KEYSPAN_ATTEMPTS", default_value_t = 5)]
    pub attempts: u32,

    /// Seconds to wait between connection attempts.
    ///
    /// Environment variable: `KEYSPAN_RETRY_DELAY`
    #[arg(short, long, env = "KEYSPAN_RETRY_DELAY", default_value_t = 10)]
    pub retry_delay: u64,

    /// Largest frame accepted from the coordinator, in bytes.
    ///
    /// Environment variable: `KEYSPAN_MAX_FRAME_BYTES`
    #[arg(long, env = "KEYSPAN_MAX_FRAME_BYTES", default_value_t = DEFAULT_MAX_FRAME_BYTES)]
    pub max_frame_bytes: usize,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one connection attempt is required")]
    ZeroAttempts,

    #[error("maximum frame size must be greater than 0")]
    ZeroFrameSize,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub server_addr: String,
    pub attempts: u32,
    pub retry_delay: Duration,
    pub max_frame_bytes: usize,
}

impl WorkerConfig {
    /// Defaults for everything but the coordinator address.
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            attempts: 5,
            retry_delay: Duration::from_secs(10),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl TryFrom<CliArgs> for WorkerConfig {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if args.max_frame_bytes == 0 {
            return Err(ConfigError::ZeroFrameSize);
        }
        Ok(Self {
            server_addr: format!("{}:{}", args.host, args.port),
            attempts: args.attempts,
            retry_delay: Duration::from_secs(args.retry_delay),
            max_frame_bytes: args.max_frame_bytes,
        })
    }
}
