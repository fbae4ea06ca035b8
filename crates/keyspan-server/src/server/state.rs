//! The coordinator's aggregate state.
//!
//! Sessions, the pending map, the retry queue and every counter that feeds a
//! termination decision live in one [`State`] behind one lock. Each method
//! here is one atomic transition: a caller that holds the guard for the
//! duration of a call can never observe a job that left the retry queue but
//! has not yet reached the pending map, or a completion whose counters were
//! not yet bumped.

use crate::server::{
    report::{Credentials, Report, TerminationReason, Winner},
    session::{Session, SessionInfo},
};
use keyspan_core::{ClientId, Job, JobId, JobInfo, JobKind, JobResult, Position, arith};
use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, SystemTime},
};

/// Static facts about a run, copied into every [`Report`].
#[derive(Clone, Debug)]
pub struct RunInfo {
    pub alphabet: String,
    pub offset: Position,
    pub length: u32,
    pub job_size: u64,
    pub kind: JobKind,
    pub max_jobs: Option<u64>,
    pub max_time: Option<Duration>,
}

/// Outcome of [`State::assign`].
#[derive(Debug)]
pub enum Assignment {
    /// The job is pending; `outgoing` is what goes on the wire.
    Assigned { outgoing: Job },
    /// The client cannot take a job right now; here is the job back.
    Rejected(Job),
}

/// Outcome of [`State::complete`].
#[derive(Debug, PartialEq, Eq)]
pub enum Completion {
    /// Nothing was pending for the client.
    NotPending,
    /// The result names a job other than the one pending.
    Mismatch { pending: JobId },
    Finished {
        job: JobId,
        success: bool,
        took: Option<Duration>,
    },
}

/// What a sweep found.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Sweep {
    /// Jobs of vanished sessions, now on the retry queue.
    pub requeued: Vec<JobId>,
    /// Live sessions holding a job past the timeout.
    pub timed_out: Vec<ClientId>,
}

#[derive(Debug)]
pub struct State {
    run: RunInfo,
    sessions: HashMap<ClientId, Session>,
    pending: HashMap<ClientId, Job>,
    retry: VecDeque<Job>,
    target_label: String,
    total_jobs: Position,
    generated_jobs: Position,
    finished_jobs: Position,
    tried: Position,
    generation_complete: bool,
    max_jobs_reached: bool,
    max_clients: usize,
    started_at: SystemTime,
    ended_at: Option<SystemTime>,
    credentials: Option<Credentials>,
    winner: Option<Winner>,
    reason: Option<TerminationReason>,
}

impl State {
    pub fn new(run: RunInfo, target_label: String, started_at: SystemTime) -> Self {
        Self {
            run,
            sessions: HashMap::new(),
            pending: HashMap::new(),
            retry: VecDeque::new(),
            target_label,
            total_jobs: Position::from(0u32),
            generated_jobs: Position::from(0u32),
            finished_jobs: Position::from(0u32),
            tried: Position::from(0u32),
            generation_complete: false,
            max_jobs_reached: false,
            max_clients: 0,
            started_at,
            ended_at: None,
            credentials: None,
            winner: None,
            reason: None,
        }
    }

    /// Restarts the run clock that the time limit is measured against.
    pub fn mark_started(&mut self, now: SystemTime) {
        self.started_at = now;
    }

    pub fn register(&mut self, session: Session) {
        self.sessions.insert(session.id, session);
        self.max_clients = self.max_clients.max(self.sessions.len());
    }

    /// Forgets a session and puts its pending job, if any, back in line.
    ///
    /// Returns the requeued job's id. A job completed before the disconnect
    /// is already gone from the pending map, so nothing is requeued for it.
    pub fn unregister(&mut self, client: ClientId) -> Option<JobId> {
        self.sessions.remove(&client);
        let job = self.pending.remove(&client)?;
        let id = job.id();
        self.retry.push_back(job);
        Some(id)
    }

    pub fn session(&self, client: ClientId) -> Option<&Session> {
        self.sessions.get(&client)
    }

    pub fn session_mut(&mut self, client: ClientId) -> Option<&mut Session> {
        self.sessions.get_mut(&client)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn has_pending(&self, client: ClientId) -> bool {
        self.pending.contains_key(&client)
    }

    /// Flags `client` as waiting in the idle queue.
    ///
    /// Returns `false` if it already is, or is unknown, in which case the
    /// caller must not enqueue it again.
    pub fn mark_queued(&mut self, client: ClientId) -> bool {
        match self.sessions.get_mut(&client) {
            Some(session) if !session.queued => {
                session.queued = true;
                true
            }
            _ => false,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pop_retry(&mut self) -> Option<Job> {
        self.retry.pop_front()
    }

    /// Returns a job to the head of the retry queue.
    pub fn push_retry_front(&mut self, job: Job) {
        self.retry.push_front(job);
    }

    pub fn retry_len(&self) -> usize {
        self.retry.len()
    }

    /// Hands `job` to `client`.
    ///
    /// The client must be connected, validated, not being kicked and not
    /// already holding a job. On success the job is stamped and pending
    /// before the caller gets anything to transmit. Either way the client
    /// leaves the idle queue.
    pub fn assign(&mut self, client: ClientId, mut job: Job, now: SystemTime) -> Assignment {
        if let Some(session) = self.sessions.get_mut(&client) {
            session.queued = false;
        }
        if self.pending.contains_key(&client) {
            return Assignment::Rejected(job);
        }
        let Some(session) = self.sessions.get_mut(&client) else {
            return Assignment::Rejected(job);
        };
        if !session.validated || session.is_closed() {
            return Assignment::Rejected(job);
        }

        job.mark_assigned(now);
        session.assigned += 1;
        session.current = Some(job.id());
        let outgoing = if session.is_seasoned() {
            job.without_target()
        } else {
            job.clone()
        };
        self.pending.insert(client, job);
        Assignment::Assigned { outgoing }
    }

    /// Records a worker's result.
    ///
    /// Removal from the pending map and every counter update happen together,
    /// so a progress check sees either none or all of a completion.
    pub fn complete(&mut self, client: ClientId, result: &JobResult, now: SystemTime) -> Completion {
        let Some(job) = self.pending.remove(&client) else {
            return Completion::NotPending;
        };
        if job.id() != result.job_id {
            let pending = job.id();
            self.pending.insert(client, job);
            return Completion::Mismatch { pending };
        }

        let count = Position::from(job.count());
        self.finished_jobs = arith::add(&self.finished_jobs, &Position::from(1u32));
        self.tried = arith::add(&self.tried, &count);

        if let Some(session) = self.sessions.get_mut(&client) {
            session.finished += 1;
            session.tried = arith::add(&session.tried, &count);
            session.current = None;
            session.history.push(job.info());
        }

        if result.success && self.credentials.is_none() {
            let username = job
                .target()
                .map(|target| target.label())
                .unwrap_or_else(|| self.target_label.clone());
            self.credentials = Some(Credentials {
                username,
                password: result.candidate.clone(),
            });
            self.winner = self.sessions.get(&client).map(|session| Winner {
                client_id: session.id.to_string(),
                addr: session.addr,
            });
        }

        Completion::Finished {
            job: job.id(),
            success: result.success,
            took: job.assigned_for(now),
        }
    }

    /// Reclaims jobs of vanished sessions and lists sessions past `timeout`.
    ///
    /// A session already being kicked is not listed again.
    pub fn sweep(&mut self, now: SystemTime, timeout: Duration) -> Sweep {
        let mut sweep = Sweep::default();

        let orphaned: Vec<ClientId> = self
            .pending
            .keys()
            .filter(|client| !self.sessions.contains_key(client))
            .copied()
            .collect();
        for client in orphaned {
            if let Some(job) = self.pending.remove(&client) {
                sweep.requeued.push(job.id());
                self.retry.push_back(job);
            }
        }

        for (client, job) in &self.pending {
            let expired = job.assigned_for(now).is_some_and(|held| held > timeout);
            let live = self
                .sessions
                .get(client)
                .is_some_and(|session| !session.is_closed());
            if expired && live {
                sweep.timed_out.push(*client);
            }
        }

        sweep
    }

    /// Kicks one session. Returns `false` if it is unknown.
    pub fn kick(&self, client: ClientId, max_frame_bytes: usize) -> bool {
        match self.sessions.get(&client) {
            Some(session) => {
                session.kick(max_frame_bytes);
                true
            }
            None => false,
        }
    }

    /// Kicks every session, returning how many were kicked.
    pub fn kick_all(&self, max_frame_bytes: usize) -> usize {
        for session in self.sessions.values() {
            session.kick(max_frame_bytes);
        }
        self.sessions.len()
    }

    /// Finds a session by full or short id.
    pub fn find_session(&self, id: &str) -> Option<ClientId> {
        self.sessions.keys().find(|client| client.matches(id)).copied()
    }

    pub fn set_total_jobs(&mut self, total: Position) {
        self.total_jobs = total;
    }

    pub fn record_generated(&mut self) -> &Position {
        self.generated_jobs = arith::add(&self.generated_jobs, &Position::from(1u32));
        &self.generated_jobs
    }

    pub fn set_target_label(&mut self, label: String) {
        self.target_label = label;
    }

    pub fn mark_generation_complete(&mut self) {
        self.generation_complete = true;
    }

    pub fn mark_max_jobs_reached(&mut self) {
        self.max_jobs_reached = true;
    }

    pub fn is_success(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.reason.is_some()
    }

    pub fn total_jobs(&self) -> &Position {
        &self.total_jobs
    }

    pub fn finished_jobs(&self) -> &Position {
        &self.finished_jobs
    }

    /// Whether the configured run time has elapsed at `now`.
    pub fn time_exceeded(&self, now: SystemTime) -> bool {
        self.run.max_time.is_some_and(|max| {
            now.duration_since(self.started_at)
                .is_ok_and(|elapsed| elapsed > max)
        })
    }

    /// The reason the run should stop at `now`, if any.
    pub fn evaluate(&self, now: SystemTime) -> Option<TerminationReason> {
        if self.is_success() {
            return Some(TerminationReason::Success);
        }
        if self.generation_complete && arith::ge(&self.finished_jobs, &self.total_jobs) {
            return Some(TerminationReason::Exhausted);
        }
        if let Some(max) = self.run.max_jobs {
            if self.max_jobs_reached && arith::ge(&self.finished_jobs, &Position::from(max)) {
                return Some(TerminationReason::MaxJobs);
            }
        }
        if self.time_exceeded(now) {
            return Some(TerminationReason::MaxTime);
        }
        None
    }

    /// Records the end of the run. Only the first call has any effect.
    pub fn finish(&mut self, reason: TerminationReason, now: SystemTime) -> bool {
        if self.reason.is_some() {
            return false;
        }
        self.reason = Some(reason);
        self.ended_at = Some(now);
        true
    }

    pub fn session_infos(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self.sessions.values().map(Session::info).collect();
        infos.sort_by_key(|info| info.connected_at);
        infos
    }

    pub fn pending_infos(&self) -> Vec<JobInfo> {
        let mut infos: Vec<JobInfo> = self.pending.values().map(Job::info).collect();
        infos.sort_by(|a, b| a.offset.cmp(&b.offset));
        infos
    }

    pub fn report(&self) -> Report {
        Report {
            started_at: self.started_at,
            ended_at: self.ended_at,
            alphabet: self.run.alphabet.clone(),
            offset: self.run.offset.clone(),
            length: self.run.length,
            job_size: self.run.job_size,
            kind: self.run.kind,
            target: self.target_label.clone(),
            total_jobs: self.total_jobs.clone(),
            generated_jobs: self.generated_jobs.clone(),
            finished_jobs: self.finished_jobs.clone(),
            candidates_tried: self.tried.clone(),
            max_clients: self.max_clients,
            success: self.is_success(),
            credentials: self.credentials.clone(),
            winner: self.winner.clone(),
            reason: self.reason.clone(),
        }
    }
}
