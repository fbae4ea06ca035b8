use clap::Parser;
use core::time::Duration;
use keyspan_core::{
    Alphabet, JobKind, Keyspace, MAX_LENGTH, Position, arith, proto::DEFAULT_MAX_FRAME_BYTES,
};
use std::path::PathBuf;

/// Runtime configuration for the `keyspan-server` binary.
///
/// Every value can be given as a CLI flag or an environment variable (also
/// read from a `.env` file). Validation happens in
/// [`ServerConfig::try_from`] before any socket is bound, so a bad offset or
/// an empty alphabet never reaches a worker.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "keyspan-server",
    version,
    about = "Partitions a password keyspace into jobs and dispatches them to workers"
)]
pub struct CliArgs {
    /// Interface to listen on.
    ///
    /// Environment variable: `KEYSPAN_HOST`
    #[arg(long, env = "KEYSPAN_HOST", default_value_t = String::from("0.0.0.0"))]
    pub host: String,

    /// TCP port workers connect to.
    ///
    /// Environment variable: `KEYSPAN_PORT`
    #[arg(short, long, env = "KEYSPAN_PORT", default_value_t = 29100)]
    pub port: u16,

    /// What is being cracked: `sha256` or `md5` (a digest), or `wpa2` (a
    /// capture file, which needs workers with a WPA2 cracker).
    ///
    /// Environment variable: `KEYSPAN_MODE`
    #[arg(short, long, env = "KEYSPAN_MODE", default_value_t = JobKind::Sha256)]
    pub mode: JobKind,

    /// The target.
    ///
    /// In `wpa2` mode this is the path of a capture named
    /// `<ESSID>_<BSSID>.<ext>`. In the hash modes it is the hex digest,
    /// optionally followed by `:<salt>`.
    ///
    /// Environment variable: `KEYSPAN_TARGET`
    #[arg(short, long, env = "KEYSPAN_TARGET")]
    pub target: String,

    /// Symbols candidates are drawn from. Duplicates are dropped, keeping the
    /// first occurrence.
    ///
    /// Environment variable: `KEYSPAN_ALPHABET`
    #[arg(short, long, env = "KEYSPAN_ALPHABET", default_value_t = String::from("0123456789"))]
    pub alphabet: String,

    /// Candidate length in symbols.
    ///
    /// Environment variable: `KEYSPAN_LENGTH`
    #[arg(short, long, env = "KEYSPAN_LENGTH", default_value_t = 8)]
    pub length: u32,

    /// Keyspace offset to start from, as a decimal integer of any size.
    ///
    /// Useful to resume an interrupted run. Must be smaller than
    /// `alphabet_size ^ length`.
    ///
    /// Environment variable: `KEYSPAN_OFFSET`
    #[arg(
        short,
        long,
        env = "KEYSPAN_OFFSET",
        default_value_t = String::from("0"),
        allow_hyphen_values = true
    )]
    pub offset: String,

    /// Number of candidates per job.
    ///
    /// Environment variable: `KEYSPAN_JOB_SIZE`
    #[arg(short = 'j', long, env = "KEYSPAN_JOB_SIZE", default_value_t = 10_000)]
    pub job_size: u64,

    /// Seconds a worker may spend on one job before it is kicked and the job
    /// rescheduled.
    ///
    /// Environment variable: `KEYSPAN_JOB_TIMEOUT`
    #[arg(long, env = "KEYSPAN_JOB_TIMEOUT", default_value_t = 600)]
    pub job_timeout: u64,

    /// Capacity of the queue between job generation and dispatch.
    ///
    /// Generation pauses while the queue is full, which bounds memory use for
    /// keyspaces far larger than could ever be materialized.
    ///
    /// Environment variable: `KEYSPAN_BACKLOG`
    #[arg(short, long, env = "KEYSPAN_BACKLOG", default_value_t = 50)]
    pub backlog: usize,

    /// Stop after this many jobs have been generated and finished. `0` means
    /// unlimited.
    ///
    /// Environment variable: `KEYSPAN_MAX_JOBS`
    #[arg(long, env = "KEYSPAN_MAX_JOBS", default_value_t = 0)]
    pub max_jobs: u64,

    /// Stop after this many seconds. `0` means unlimited.
    ///
    /// Environment variable: `KEYSPAN_MAX_TIME`
    #[arg(long, env = "KEYSPAN_MAX_TIME", default_value_t = 0)]
    pub max_time: u64,

    /// Milliseconds between sweeps of the pending jobs.
    ///
    /// Environment variable: `KEYSPAN_SWEEP_INTERVAL_MS`
    #[arg(long, env = "KEYSPAN_SWEEP_INTERVAL_MS", default_value_t = 3_000)]
    pub sweep_interval_ms: u64,

    /// Milliseconds between progress and termination checks.
    ///
    /// Environment variable: `KEYSPAN_PROGRESS_INTERVAL_MS`
    #[arg(long, env = "KEYSPAN_PROGRESS_INTERVAL_MS", default_value_t = 2_000)]
    pub progress_interval_ms: u64,

    /// Largest frame accepted from or sent to a worker, in bytes.
    ///
    /// Must fit the whole target, since the first task to every worker
    /// carries it.
    ///
    /// Environment variable: `KEYSPAN_MAX_FRAME_BYTES`
    #[arg(long, env = "KEYSPAN_MAX_FRAME_BYTES", default_value_t = DEFAULT_MAX_FRAME_BYTES)]
    pub max_frame_bytes: usize,

    /// Poll until the capture file appears instead of failing at startup.
    ///
    /// Environment variable: `KEYSPAN_WAIT_FOR_TARGET`
    #[arg(short, long, env = "KEYSPAN_WAIT_FOR_TARGET", default_value_t = false)]
    pub wait_for_target: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("alphabet must contain at least one symbol")]
    EmptyAlphabet,

    #[error("candidate length must be at least 1")]
    ZeroLength,

    #[error("candidate length {length} exceeds the maximum of {max}")]
    LengthTooLong { length: u32, max: u32 },

    #[error("invalid {field}: {value:?} is not a non-negative decimal integer")]
    InvalidNumber { field: &'static str, value: String },

    #[error("offset {offset} is outside a keyspace of {size} candidates")]
    InvalidOffset { offset: Position, size: Position },

    #[error("job size must be greater than 0")]
    ZeroJobSize,

    #[error("backlog must be greater than 0")]
    ZeroBacklog,

    #[error("{field} must be greater than 0")]
    ZeroInterval { field: &'static str },

    #[error("target {0} does not exist")]
    MissingTarget(PathBuf),

    #[error("unable to read target {path}: {source}")]
    UnreadableTarget {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid target: {reason}")]
    InvalidTarget { reason: String },
}

/// Where the thing being cracked comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetSource {
    /// A WPA2 capture on disk.
    Capture(PathBuf),
    /// A hash digest given inline.
    Digest {
        kind: JobKind,
        digest: String,
        salt: Option<String>,
    },
}

impl TargetSource {
    pub const fn kind(&self) -> JobKind {
        match self {
            Self::Capture(_) => JobKind::Wpa2,
            Self::Digest { kind, .. } => *kind,
        }
    }

    /// Parses `<hex digest>[:<salt>]` for the hash `kind`: 32 hex digits for
    /// MD5, 64 for SHA-256.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTarget`] if `kind` is not a hash or the
    /// digest has the wrong size.
    pub fn parse_digest(kind: JobKind, input: &str) -> Result<Self, ConfigError> {
        let Some(len) = kind.digest_len() else {
            return Err(ConfigError::InvalidTarget {
                reason: format!("{kind} targets are capture files, not digests"),
            });
        };
        let (digest, salt) = match input.split_once(':') {
            Some((digest, salt)) => (digest, Some(salt.to_string())),
            None => (input, None),
        };
        if digest.len() != len * 2 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ConfigError::InvalidTarget {
                reason: format!("{digest:?} is not a hex-encoded {kind} digest"),
            });
        }
        Ok(Self::Digest {
            kind,
            digest: digest.to_ascii_lowercase(),
            salt: salt.filter(|s| !s.is_empty()),
        })
    }

    /// Label shown in reports.
    pub fn label(&self) -> String {
        match self {
            Self::Capture(path) => path.display().to_string(),
            Self::Digest {
                digest,
                salt: Some(salt),
                ..
            } => format!("{digest}:{salt}"),
            Self::Digest {
                digest, salt: None, ..
            } => digest.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub target: TargetSource,
    pub alphabet: Alphabet,
    pub length: u32,
    pub offset: Position,
    pub job_size: u64,
    pub job_timeout: Duration,
    pub backlog: usize,
    /// `None` means unlimited.
    pub max_jobs: Option<u64>,
    /// `None` means unlimited.
    pub max_time: Option<Duration>,
    pub sweep_interval: Duration,
    pub progress_interval: Duration,
    pub max_frame_bytes: usize,
    pub wait_for_target: bool,
}

impl ServerConfig {
    /// Defaults for everything but the target.
    pub fn new(target: TargetSource) -> Self {
        Self {
            listen_addr: String::from("0.0.0.0:29100"),
            target,
            alphabet: Alphabet::decimal(),
            length: 8,
            offset: Position::from(0u32),
            job_size: 10_000,
            job_timeout: Duration::from_secs(600),
            backlog: 50,
            max_jobs: None,
            max_time: None,
            sweep_interval: Duration::from_secs(3),
            progress_interval: Duration::from_secs(2),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            wait_for_target: false,
        }
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroLength`] or [`ConfigError::LengthTooLong`]
    /// for a length outside `1..=MAX_LENGTH`.
    pub fn keyspace(&self) -> Result<Keyspace, ConfigError> {
        if self.length == 0 {
            return Err(ConfigError::ZeroLength);
        }
        if self.length > MAX_LENGTH {
            return Err(ConfigError::LengthTooLong {
                length: self.length,
                max: MAX_LENGTH,
            });
        }
        Keyspace::new(self.alphabet.clone(), self.length).map_err(|_| ConfigError::ZeroLength)
    }

    /// Checks every value that would otherwise fail mid-run.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let keyspace = self.keyspace()?;
        if !keyspace.contains(&self.offset) {
            return Err(ConfigError::InvalidOffset {
                offset: self.offset.clone(),
                size: keyspace.size().clone(),
            });
        }
        if self.job_size == 0 {
            return Err(ConfigError::ZeroJobSize);
        }
        if self.backlog == 0 {
            return Err(ConfigError::ZeroBacklog);
        }
        if self.job_timeout.is_zero() {
            return Err(ConfigError::ZeroInterval {
                field: "job timeout",
            });
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::ZeroInterval {
                field: "sweep interval",
            });
        }
        if self.progress_interval.is_zero() {
            return Err(ConfigError::ZeroInterval {
                field: "progress interval",
            });
        }
        if let TargetSource::Capture(path) = &self.target {
            if !self.wait_for_target && !path.exists() {
                return Err(ConfigError::MissingTarget(path.clone()));
            }
        }
        Ok(())
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let alphabet = Alphabet::new(&args.alphabet).map_err(|_| ConfigError::EmptyAlphabet)?;
        let offset = arith::parse_decimal(&args.offset).map_err(|_| ConfigError::InvalidNumber {
            field: "offset",
            value: args.offset.clone(),
        })?;
        let target = match args.mode {
            JobKind::Wpa2 => TargetSource::Capture(PathBuf::from(&args.target)),
            kind @ (JobKind::Md5 | JobKind::Sha256) => {
                TargetSource::parse_digest(kind, &args.target)?
            }
        };

        let config = Self {
            listen_addr: format!("{}:{}", args.host, args.port),
            target,
            alphabet,
            length: args.length,
            offset,
            job_size: args.job_size,
            job_timeout: Duration::from_secs(args.job_timeout),
            backlog: args.backlog,
            max_jobs: (args.max_jobs > 0).then_some(args.max_jobs),
            max_time: (args.max_time > 0).then(|| Duration::from_secs(args.max_time)),
            sweep_interval: Duration::from_millis(args.sweep_interval_ms),
            progress_interval: Duration::from_millis(args.progress_interval_ms),
            max_frame_bytes: args.max_frame_bytes,
            wait_for_target: args.wait_for_target,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let digest = "ab".repeat(32);
        let mut argv = vec!["keyspan-server", "--mode", "sha256", "--target", digest.as_str()];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::try_from(args(&[])).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:29100");
        assert_eq!(config.alphabet.to_string(), "0123456789");
        assert_eq!(config.length, 8);
        assert_eq!(config.job_size, 10_000);
        assert_eq!(config.backlog, 50);
        assert_eq!(config.job_timeout, Duration::from_secs(600));
        assert_eq!(config.max_jobs, None);
        assert_eq!(config.max_time, None);
        assert_eq!(config.sweep_interval, Duration::from_secs(3));
        assert_eq!(config.progress_interval, Duration::from_secs(2));
    }

    #[test]
    fn offset_must_lie_inside_the_keyspace() {
        assert!(ServerConfig::try_from(args(&["--length", "3", "--offset", "999"])).is_ok());
        assert!(matches!(
            ServerConfig::try_from(args(&["--length", "3", "--offset", "1000"])),
            Err(ConfigError::InvalidOffset { .. })
        ));
        assert!(matches!(
            ServerConfig::try_from(args(&["--offset", "-5"])),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            ServerConfig::try_from(args(&["--offset=12x"])),
            Err(ConfigError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn degenerate_values_are_rejected() {
        assert!(matches!(
            ServerConfig::try_from(args(&["--alphabet", ""])),
            Err(ConfigError::EmptyAlphabet)
        ));
        assert!(matches!(
            ServerConfig::try_from(args(&["--length", "0"])),
            Err(ConfigError::ZeroLength)
        ));
        assert!(matches!(
            ServerConfig::try_from(args(&["--job-size", "0"])),
            Err(ConfigError::ZeroJobSize)
        ));
        assert!(matches!(
            ServerConfig::try_from(args(&["--backlog", "0"])),
            Err(ConfigError::ZeroBacklog)
        ));
        assert!(matches!(
            ServerConfig::try_from(args(&["--job-timeout", "0"])),
            Err(ConfigError::ZeroInterval {
                field: "job timeout"
            })
        ));
    }

    #[test]
    fn absurd_lengths_are_rejected_without_sizing_the_keyspace() {
        let started = std::time::Instant::now();
        assert!(matches!(
            ServerConfig::try_from(args(&["--length", "4000000000"])),
            Err(ConfigError::LengthTooLong { length: 4_000_000_000, .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(1));
        let max = MAX_LENGTH.to_string();
        assert!(ServerConfig::try_from(args(&["--length", max.as_str()])).is_ok());
    }

    #[test]
    fn hash_mode_is_the_default() {
        let digest = "ab".repeat(32);
        let parsed = CliArgs::try_parse_from(["keyspan-server", "--target", digest.as_str()])
            .unwrap();
        assert_eq!(parsed.mode, JobKind::Sha256);
        let config = ServerConfig::try_from(parsed).unwrap();
        assert_eq!(config.target.kind(), JobKind::Sha256);
    }

    #[test]
    fn duplicate_symbols_are_collapsed() {
        let config = ServerConfig::try_from(args(&["--alphabet", "aabbcab"])).unwrap();
        assert_eq!(config.alphabet.to_string(), "abc");
    }

    #[test]
    fn digest_targets_accept_an_optional_salt() {
        let salted =
            TargetSource::parse_digest(JobKind::Sha256, &format!("{}:pepper", "AB".repeat(32)))
                .unwrap();
        assert_eq!(
            salted,
            TargetSource::Digest {
                kind: JobKind::Sha256,
                digest: "ab".repeat(32),
                salt: Some("pepper".to_string())
            }
        );
        assert!(TargetSource::parse_digest(JobKind::Sha256, "abc").is_err());
        assert!(TargetSource::parse_digest(JobKind::Sha256, &"zz".repeat(32)).is_err());
        assert!(TargetSource::parse_digest(JobKind::Wpa2, &"ab".repeat(32)).is_err());
    }

    #[test]
    fn md5_digests_are_32_hex_digits() {
        let md5 = TargetSource::parse_digest(JobKind::Md5, &"CD".repeat(16)).unwrap();
        assert_eq!(md5.kind(), JobKind::Md5);
        assert_eq!(md5.label(), "cd".repeat(16));
        assert!(TargetSource::parse_digest(JobKind::Md5, &"cd".repeat(32)).is_err());
        assert!(TargetSource::parse_digest(JobKind::Sha256, &"cd".repeat(16)).is_err());

        let argv = [
            "keyspan-server",
            "--mode",
            "md5",
            "--target",
            "5d41402abc4b2a76b9719d911017c592",
        ];
        let config = ServerConfig::try_from(CliArgs::try_parse_from(argv).unwrap()).unwrap();
        assert_eq!(config.target.kind(), JobKind::Md5);
    }

    #[test]
    fn missing_capture_is_fatal_unless_waiting() {
        let base = [
            "keyspan-server",
            "--mode",
            "wpa2",
            "--target",
            "/nonexistent/net_001122334455.pcap",
        ];
        let parsed = CliArgs::try_parse_from(base).unwrap();
        assert!(matches!(
            ServerConfig::try_from(parsed),
            Err(ConfigError::MissingTarget(_))
        ));

        let waiting = CliArgs::try_parse_from(base.iter().copied().chain(["--wait-for-target"]))
            .unwrap();
        assert!(ServerConfig::try_from(waiting).is_ok());
    }
}
