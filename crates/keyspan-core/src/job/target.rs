use bytes::Bytes;
use core::{fmt, str::FromStr};

/// Shape of a job's target payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// A captured WPA2 handshake.
    Wpa2,
    /// A hex-encoded MD5 digest, optionally salted.
    Md5,
    /// A hex-encoded SHA-256 digest, optionally salted.
    Sha256,
}

impl JobKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wpa2 => "WPA2",
            Self::Md5 => "MD5",
            Self::Sha256 => "SHA256",
        }
    }

    /// Raw digest size in bytes, `None` for kinds that are not hashes.
    pub const fn digest_len(self) -> Option<usize> {
        match self {
            Self::Wpa2 => None,
            Self::Md5 => Some(16),
            Self::Sha256 => Some(32),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wpa2" => Ok(Self::Wpa2),
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            other => Err(format!(
                "unknown job kind {other:?}, expected wpa2, md5 or sha256"
            )),
        }
    }
}

/// What a worker tests candidates against.
#[derive(Clone, PartialEq, Eq)]
pub enum Target {
    Wpa2 {
        capture: Bytes,
        essid: String,
        bssid: String,
    },
    Md5 {
        digest: String,
        salt: Option<String>,
    },
    Sha256 {
        digest: String,
        salt: Option<String>,
    },
}

impl Target {
    /// Builds a hash target of `kind`, or `None` if `kind` is not a hash.
    pub fn hash(kind: JobKind, digest: String, salt: Option<String>) -> Option<Self> {
        match kind {
            JobKind::Wpa2 => None,
            JobKind::Md5 => Some(Self::Md5 { digest, salt }),
            JobKind::Sha256 => Some(Self::Sha256 { digest, salt }),
        }
    }

    pub const fn kind(&self) -> JobKind {
        match self {
            Self::Wpa2 { .. } => JobKind::Wpa2,
            Self::Md5 { .. } => JobKind::Md5,
            Self::Sha256 { .. } => JobKind::Sha256,
        }
    }

    /// Hex digest and salt of a hash target.
    pub fn digest(&self) -> Option<(&str, Option<&str>)> {
        match self {
            Self::Wpa2 { .. } => None,
            Self::Md5 { digest, salt } | Self::Sha256 { digest, salt } => {
                Some((digest.as_str(), salt.as_deref()))
            }
        }
    }

    /// Human label used as the credential "username" in reports.
    pub fn label(&self) -> String {
        match self {
            Self::Wpa2 { essid, bssid, .. } => format!("{essid} {bssid}"),
            Self::Md5 {
                digest,
                salt: Some(salt),
            }
            | Self::Sha256 {
                digest,
                salt: Some(salt),
            } => format!("{digest}:{salt}"),
            Self::Md5 { digest, salt: None } | Self::Sha256 { digest, salt: None } => {
                digest.clone()
            }
        }
    }
}

// Captures can be megabytes; keep them out of logs.
impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wpa2 {
                capture,
                essid,
                bssid,
            } => f
                .debug_struct("Wpa2")
                .field("capture_bytes", &capture.len())
                .field("essid", essid)
                .field("bssid", bssid)
                .finish(),
            Self::Md5 { digest, salt } => f
                .debug_struct("Md5")
                .field("digest", digest)
                .field("salt", salt)
                .finish(),
            Self::Sha256 { digest, salt } => f
                .debug_struct("Sha256")
                .field("digest", digest)
                .field("salt", salt)
                .finish(),
        }
    }
}
