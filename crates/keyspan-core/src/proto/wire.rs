//! Protobuf messages exchanged between coordinator and workers.
//!
//! The schema is small and stable, so the messages are declared directly with
//! `prost` derives instead of being generated from a `.proto` file.

use crate::{
    Alphabet, Error, GenerationParams as Params, Job, JobId, JobKind as Kind, JobResult as Verdict,
    Result, Target as DomainTarget, arith,
};
use bytes::Bytes;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MessageKind {
    Hello = 0,
    Ack = 1,
    Idle = 2,
    Task = 3,
    Finished = 4,
    ClientError = 5,
    Leave = 6,
}

impl MessageKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hello => "Hello",
            Self::Ack => "Ack",
            Self::Idle => "Idle",
            Self::Task => "Task",
            Self::Finished => "Finished",
            Self::ClientError => "ClientError",
            Self::Leave => "Leave",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum JobKind {
    Unspecified = 0,
    Wpa2 = 1,
    Sha256 = 2,
    Md5 = 3,
}

/// Outer frame body: every message shares this envelope.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Envelope {
    #[prost(enumeration = "MessageKind", tag = "1")]
    pub kind: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub id: Vec<u8>,
    #[prost(bytes = "bytes", tag = "3")]
    pub payload: Bytes,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Task {
    #[prost(enumeration = "JobKind", tag = "1")]
    pub kind: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub id: Vec<u8>,
    #[prost(oneof = "task::Target", tags = "3, 4, 7")]
    pub target: Option<task::Target>,
    #[prost(message, optional, tag = "5")]
    pub params: Option<GenerationParams>,
    /// Milliseconds since the Unix epoch; zero when never dispatched.
    #[prost(uint64, tag = "6")]
    pub assigned_at_ms: u64,
}

pub mod task {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Target {
        #[prost(message, tag = "3")]
        Wpa2(super::Wpa2Target),
        #[prost(message, tag = "4")]
        Sha256(super::DigestTarget),
        #[prost(message, tag = "7")]
        Md5(super::DigestTarget),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Wpa2Target {
    #[prost(bytes = "bytes", tag = "1")]
    pub capture: Bytes,
    #[prost(string, tag = "2")]
    pub essid: String,
    #[prost(string, tag = "3")]
    pub bssid: String,
}

/// Hex digest shared by every hash kind.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DigestTarget {
    #[prost(string, tag = "1")]
    pub digest: String,
    #[prost(string, optional, tag = "2")]
    pub salt: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GenerationParams {
    #[prost(string, tag = "1")]
    pub alphabet: String,
    #[prost(uint32, tag = "2")]
    pub length: u32,
    /// Big-endian magnitude of the starting offset.
    #[prost(bytes = "vec", tag = "3")]
    pub offset: Vec<u8>,
    #[prost(uint64, tag = "4")]
    pub count: u64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct JobResult {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub candidate: String,
    #[prost(bytes = "vec", tag = "3")]
    pub job_id: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ClientError {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub job_id: Option<Vec<u8>>,
    #[prost(string, tag = "2")]
    pub reason: String,
}

impl From<Kind> for JobKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Wpa2 => Self::Wpa2,
            Kind::Md5 => Self::Md5,
            Kind::Sha256 => Self::Sha256,
        }
    }
}

fn domain_kind(raw: i32) -> Result<Kind> {
    match JobKind::try_from(raw) {
        Ok(JobKind::Wpa2) => Ok(Kind::Wpa2),
        Ok(JobKind::Md5) => Ok(Kind::Md5),
        Ok(JobKind::Sha256) => Ok(Kind::Sha256),
        Ok(JobKind::Unspecified) | Err(_) => {
            Err(Error::decode(format!("unknown job kind tag {raw}")))
        }
    }
}

fn to_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn from_millis(ms: u64) -> Option<SystemTime> {
    (ms != 0).then(|| UNIX_EPOCH + Duration::from_millis(ms))
}

impl From<&DomainTarget> for task::Target {
    fn from(target: &DomainTarget) -> Self {
        match target {
            DomainTarget::Wpa2 {
                capture,
                essid,
                bssid,
            } => Self::Wpa2(Wpa2Target {
                capture: capture.clone(),
                essid: essid.clone(),
                bssid: bssid.clone(),
            }),
            DomainTarget::Md5 { digest, salt } => Self::Md5(DigestTarget {
                digest: digest.clone(),
                salt: salt.clone(),
            }),
            DomainTarget::Sha256 { digest, salt } => Self::Sha256(DigestTarget {
                digest: digest.clone(),
                salt: salt.clone(),
            }),
        }
    }
}

impl From<task::Target> for DomainTarget {
    fn from(target: task::Target) -> Self {
        match target {
            task::Target::Wpa2(t) => Self::Wpa2 {
                capture: t.capture,
                essid: t.essid,
                bssid: t.bssid,
            },
            task::Target::Md5(t) => Self::Md5 {
                digest: t.digest,
                salt: t.salt,
            },
            task::Target::Sha256(t) => Self::Sha256 {
                digest: t.digest,
                salt: t.salt,
            },
        }
    }
}

impl From<&Job> for Task {
    fn from(job: &Job) -> Self {
        let params = job.params();
        Self {
            kind: JobKind::from(job.kind()).into(),
            id: job.id().to_bytes().to_vec(),
            target: job.target().map(task::Target::from),
            params: Some(GenerationParams {
                alphabet: params.alphabet.to_string(),
                length: params.length,
                offset: arith::to_be_bytes(&params.offset),
                count: params.count,
            }),
            assigned_at_ms: job.assigned_at().map_or(0, to_millis),
        }
    }
}

impl TryFrom<Task> for Job {
    type Error = Error;

    fn try_from(task: Task) -> Result<Self> {
        let kind = domain_kind(task.kind)?;
        let id = JobId::from_slice(&task.id)?;
        let raw = task
            .params
            .ok_or_else(|| Error::decode("task without generation params"))?;
        let params = Params {
            alphabet: Alphabet::new(&raw.alphabet)
                .map_err(|e| Error::decode(format!("bad alphabet: {e}")))?,
            length: raw.length,
            offset: arith::from_be_bytes(&raw.offset),
            count: raw.count,
        };
        Self::from_parts(
            id,
            kind,
            task.target.map(DomainTarget::from),
            params,
            from_millis(task.assigned_at_ms),
        )
    }
}

impl From<&Verdict> for JobResult {
    fn from(result: &Verdict) -> Self {
        Self {
            success: result.success,
            candidate: result.candidate.clone(),
            job_id: result.job_id.to_bytes().to_vec(),
        }
    }
}

impl TryFrom<JobResult> for Verdict {
    type Error = Error;

    fn try_from(result: JobResult) -> Result<Self> {
        Ok(Self {
            job_id: JobId::from_slice(&result.job_id)?,
            success: result.success,
            candidate: result.candidate,
        })
    }
}
