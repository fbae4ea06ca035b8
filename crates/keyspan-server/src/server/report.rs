//! Read-only summary of a run.
//!
//! A [`Report`] can be taken at any time through
//! [`CoordinatorHandle::report`](crate::CoordinatorHandle::report); the final
//! one is returned by [`Coordinator::run`](crate::Coordinator::run).
//! Formatting and persistence are left to the caller.

use core::fmt;
use keyspan_core::{JobKind, Position, arith};
use std::{net::SocketAddr, time::SystemTime};

/// Why a run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminationReason {
    /// Every generated job finished.
    Exhausted,
    /// The configured job limit was generated and finished.
    MaxJobs,
    /// The configured run time elapsed.
    MaxTime,
    /// A worker found the password.
    Success,
    /// SIGINT or SIGTERM.
    Signal,
    /// [`CoordinatorHandle::terminate`](crate::CoordinatorHandle::terminate).
    Requested,
    /// The run could not continue.
    Fatal(String),
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => f.write_str("all jobs finished"),
            Self::MaxJobs => f.write_str("maximum number of jobs reached"),
            Self::MaxTime => f.write_str("maximum run time reached"),
            Self::Success => f.write_str("password found"),
            Self::Signal => f.write_str("interrupted"),
            Self::Requested => f.write_str("termination requested"),
            Self::Fatal(reason) => write!(f, "fatal error: {reason}"),
        }
    }
}

/// Winning credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    /// `"<ESSID> <BSSID>"` for captures, the digest for hashes.
    pub username: String,
    pub password: String,
}

/// The worker that found the password.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Winner {
    pub client_id: String,
    pub addr: SocketAddr,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub started_at: SystemTime,
    pub ended_at: Option<SystemTime>,
    pub alphabet: String,
    pub offset: Position,
    pub length: u32,
    pub job_size: u64,
    pub kind: JobKind,
    pub target: String,
    pub total_jobs: Position,
    pub generated_jobs: Position,
    pub finished_jobs: Position,
    pub candidates_tried: Position,
    pub max_clients: usize,
    pub success: bool,
    pub credentials: Option<Credentials>,
    pub winner: Option<Winner>,
    pub reason: Option<TerminationReason>,
}

impl Report {
    /// Finished jobs as a percentage of the total.
    pub fn progress(&self) -> f64 {
        arith::percentage(&self.total_jobs, &self.finished_jobs)
    }

    /// Emits the report as log lines.
    pub fn log(&self) {
        let elapsed = self
            .ended_at
            .unwrap_or_else(SystemTime::now)
            .duration_since(self.started_at)
            .unwrap_or_default();

        tracing::info!(
            kind = %self.kind,
            target = %self.target,
            alphabet = %self.alphabet,
            length = self.length,
            offset = %self.offset,
            job_size = self.job_size,
            "Run summary"
        );
        tracing::info!(
            finished = %self.finished_jobs,
            total = %self.total_jobs,
            tried = %self.candidates_tried,
            max_clients = self.max_clients,
            elapsed_secs = elapsed.as_secs(),
            "Finished {:.2}% of jobs",
            self.progress()
        );
        match (&self.credentials, &self.winner) {
            (Some(credentials), Some(winner)) => tracing::info!(
                username = %credentials.username,
                password = %credentials.password,
                client = %winner.client_id,
                addr = %winner.addr,
                "Password found"
            ),
            _ => tracing::info!("Password not found"),
        }
        if let Some(reason) = &self.reason {
            tracing::info!("Run ended: {reason}");
        }
    }
}
