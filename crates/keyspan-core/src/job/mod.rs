//! Units of work handed to workers.
//!
//! A [`Job`] is an immutable slice `offset..offset + count` of one
//! [`Keyspace`] plus the [`Target`] the worker should test each candidate
//! against. The only field that changes after construction is the
//! assigned-at timestamp, which the coordinator stamps on every dispatch.

mod target;
#[cfg(test)]
mod tests;

pub use target::*;

use crate::{Alphabet, Error, JobId, Keyspace, Position, Result, arith, proto::wire};
use prost::Message as _;
use std::time::{Duration, SystemTime};

/// Everything a worker needs to regenerate its candidate range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationParams {
    pub alphabet: Alphabet,
    pub length: u32,
    pub offset: Position,
    pub count: u64,
}

impl GenerationParams {
    /// # Errors
    ///
    /// Returns [`Error::InvalidLength`] for a zero length.
    pub fn keyspace(&self) -> Result<Keyspace> {
        Keyspace::new(self.alphabet.clone(), self.length)
    }

    /// One past the last offset covered.
    pub fn end(&self) -> Position {
        arith::add(&self.offset, &Position::from(self.count))
    }

    /// Candidate at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if the range lies outside its keyspace.
    pub fn first(&self) -> Result<String> {
        self.keyspace()?.generate(&self.offset)
    }

    /// Candidate at `offset + count - 1`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if the range is empty or lies outside its
    /// keyspace.
    pub fn last(&self) -> Result<String> {
        let last = arith::sub(&self.end(), &Position::from(1u32))?;
        self.keyspace()?.generate(&last)
    }

    fn validate(&self) -> Result<()> {
        let keyspace = self.keyspace()?;
        if self.count == 0 {
            return Err(Error::OutOfRange {
                offset: self.offset.to_string(),
                size: keyspace.size().to_string(),
            });
        }
        let last = arith::sub(&self.end(), &Position::from(1u32))?;
        if !keyspace.contains(&last) {
            return Err(Error::OutOfRange {
                offset: last.to_string(),
                size: keyspace.size().to_string(),
            });
        }
        Ok(())
    }
}

/// A contiguous keyspace slice bound to a target.
///
/// `target` is `None` only on a job decoded from a task that omitted the
/// payload because the receiving worker already holds it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    id: JobId,
    kind: JobKind,
    target: Option<Target>,
    params: GenerationParams,
    assigned_at: Option<SystemTime>,
}

impl Job {
    /// Creates a job with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] unless `offset + count - 1` lies inside
    /// the keyspace, and [`Error::InvalidLength`] for a zero length.
    pub fn new(target: Target, params: GenerationParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            id: JobId::new(),
            kind: target.kind(),
            target: Some(target),
            params,
            assigned_at: None,
        })
    }

    pub const fn id(&self) -> JobId {
        self.id
    }

    pub const fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub const fn params(&self) -> &GenerationParams {
        &self.params
    }

    pub const fn count(&self) -> u64 {
        self.params.count
    }

    pub const fn assigned_at(&self) -> Option<SystemTime> {
        self.assigned_at
    }

    pub fn mark_assigned(&mut self, at: SystemTime) {
        self.assigned_at = Some(at);
    }

    /// Time since the last dispatch, or `None` if the job was never sent.
    pub fn assigned_for(&self, now: SystemTime) -> Option<Duration> {
        self.assigned_at
            .map(|at| now.duration_since(at).unwrap_or(Duration::ZERO))
    }

    /// A copy carrying everything but the target payload.
    #[must_use]
    pub fn without_target(&self) -> Self {
        Self {
            target: None,
            ..self.clone()
        }
    }

    /// Fills in a target omitted on the wire. The kind must match.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if `target` is of a different kind.
    pub fn with_target(mut self, target: Target) -> Result<Self> {
        if target.kind() != self.kind {
            return Err(Error::decode(format!(
                "{} target supplied for a {} job",
                target.kind(),
                self.kind
            )));
        }
        self.target = Some(target);
        Ok(self)
    }

    pub fn short_id(&self) -> String {
        self.id.short()
    }

    /// Reporting summary that never exposes the target payload.
    pub fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id.short(),
            kind: self.kind,
            alphabet: self.params.alphabet.to_string(),
            length: self.params.length,
            count: self.params.count,
            offset: self.params.offset.clone(),
            assigned_at: self.assigned_at,
            first: self.params.first().ok(),
            last: self.params.last().ok(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        wire::Task::from(self).encode_to_vec()
    }

    /// # Errors
    ///
    /// Returns [`Error::Decode`] for malformed bytes or a range outside the
    /// keyspace.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::try_from(wire::Task::decode(bytes)?)
    }

    pub(crate) fn from_parts(
        id: JobId,
        kind: JobKind,
        target: Option<Target>,
        params: GenerationParams,
        assigned_at: Option<SystemTime>,
    ) -> Result<Self> {
        params
            .validate()
            .map_err(|e| Error::decode(format!("invalid generation params: {e}")))?;
        if let Some(other) = target.as_ref().map(Target::kind).filter(|k| *k != kind) {
            return Err(Error::decode(format!(
                "{kind} job carries a {other} target"
            )));
        }
        Ok(Self {
            id,
            kind,
            target,
            params,
            assigned_at,
        })
    }
}

/// Summary of a job for status snapshots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobInfo {
    pub id: String,
    pub kind: JobKind,
    pub alphabet: String,
    pub length: u32,
    pub count: u64,
    pub offset: Position,
    pub assigned_at: Option<SystemTime>,
    pub first: Option<String>,
    pub last: Option<String>,
}

/// A worker's verdict on one job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobResult {
    pub job_id: JobId,
    pub success: bool,
    /// The matching candidate (or the salted string that matched) when
    /// `success` is set, empty otherwise.
    pub candidate: String,
}

impl JobResult {
    pub fn found(job_id: JobId, candidate: impl Into<String>) -> Self {
        Self {
            job_id,
            success: true,
            candidate: candidate.into(),
        }
    }

    pub const fn exhausted(job_id: JobId) -> Self {
        Self {
            job_id,
            success: false,
            candidate: String::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        wire::JobResult::from(self).encode_to_vec()
    }

    /// # Errors
    ///
    /// Returns [`Error::Decode`] for malformed bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::try_from(wire::JobResult::decode(bytes)?)
    }
}
