//! The coordinator and its control handle.
//!
//! ## Structure
//!
//! - [`connection`] - accept loop, the register/unregister loop and the
//!   per-connection task pair (receive loop + writer).
//! - [`handler`] - routes each decoded message to its handler.
//!
//! A [`Coordinator`] owns the listener until [`Coordinator::run`] consumes it.
//! Everything the background tasks share sits in one [`Shared`] behind an
//! `Arc`; [`CoordinatorHandle`] is a cheap clone of that `Arc` for status
//! queries and operator actions while the run is in progress.

pub mod connection;
pub mod handler;

use crate::server::{
    config::ServerConfig,
    dispatch::{dispatch_loop, generator::generate_jobs, progress::progress_loop, sweeper::sweep_loop},
    error::ServerError,
    inspector::{FilenameInspector, TargetInspector},
    report::{Report, TerminationReason},
    session::SessionInfo,
    state::{RunInfo, State},
    telemetry::increment_clients_kicked,
};
use connection::{accept_loop, register_loop};
use keyspan_core::{ClientId, JobInfo};
use parking_lot::Mutex;
use portable_atomic::{AtomicBool, Ordering};
use std::{net::SocketAddr, sync::Arc, time::SystemTime};
use tokio::{
    net::TcpListener,
    sync::{Notify, mpsc},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

/// State and signals shared by every coordinator task.
pub struct Shared {
    pub config: ServerConfig,
    pub state: Mutex<State>,
    /// Pinged whenever a job lands on the retry queue.
    pub retry_ready: Notify,
    /// Clients ready for their next job, in the order they became ready.
    pub idle_tx: mpsc::UnboundedSender<ClientId>,
    pub shutdown: CancellationToken,
    terminated: AtomicBool,
}

impl Shared {
    fn new(config: ServerConfig, state: State, idle_tx: mpsc::UnboundedSender<ClientId>) -> Self {
        Self {
            config,
            state: Mutex::new(state),
            retry_ready: Notify::new(),
            idle_tx,
            shutdown: CancellationToken::new(),
            terminated: AtomicBool::new(false),
        }
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.config.max_frame_bytes
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Ends the run: records `reason`, asks every client to leave and fires
    /// the shutdown token.
    ///
    /// Only the first call does anything; later calls, whatever their
    /// reason, return immediately.
    pub fn terminate(&self, reason: TerminationReason) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }

        let kicked = {
            let mut state = self.state.lock();
            state.finish(reason.clone(), SystemTime::now());
            state.kick_all(self.max_frame_bytes())
        };
        for _ in 0..kicked {
            increment_clients_kicked();
        }

        match &reason {
            TerminationReason::Fatal(_) => tracing::error!("Terminating: {reason}"),
            _ => tracing::info!("Terminating: {reason}"),
        }
        if kicked > 0 {
            tracing::info!("Asked {kicked} client(s) to leave");
        }
        self.shutdown.cancel();
    }
}

/// A bound, not yet running coordinator.
pub struct Coordinator {
    listener: TcpListener,
    shared: Arc<Shared>,
    idle_rx: mpsc::UnboundedReceiver<ClientId>,
    inspector: Arc<dyn TargetInspector>,
}

impl Coordinator {
    /// Validates `config` and binds its listen address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] for an invalid configuration and
    /// [`ServerError::Io`] if the address cannot be bound.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        Self::bind_with_inspector(config, Arc::new(FilenameInspector)).await
    }

    /// Like [`Coordinator::bind`], resolving capture identifiers with
    /// `inspector`.
    ///
    /// # Errors
    ///
    /// See [`Coordinator::bind`].
    pub async fn bind_with_inspector(
        config: ServerConfig,
        inspector: Arc<dyn TargetInspector>,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let run = RunInfo {
            alphabet: config.alphabet.to_string(),
            offset: config.offset.clone(),
            length: config.length,
            job_size: config.job_size,
            kind: config.target.kind(),
            max_jobs: config.max_jobs,
            max_time: config.max_time,
        };
        let state = State::new(run, config.target.label(), SystemTime::now());

        let listener = TcpListener::bind(&config.listen_addr).await?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        let (idle_tx, idle_rx) = mpsc::unbounded_channel();
        Ok(Self {
            listener,
            shared: Arc::new(Shared::new(config, state, idle_tx)),
            idle_rx,
            inspector,
        })
    }

    /// # Errors
    ///
    /// Returns the OS error if the listener has no local address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Runs until a termination condition fires, then returns the final
    /// report.
    ///
    /// Generation, dispatch, sweeping, progress checks, registration and
    /// accepting each run as their own task. Once terminated, connected
    /// clients are given a grace period to receive their Leave before
    /// their connections are dropped.
    ///
    /// # Errors
    ///
    /// Conditions that end the run early, such as an unreadable target, are
    /// reported through [`Report::reason`] rather than as an error.
    pub async fn run(self) -> Result<Report, ServerError> {
        let Self {
            listener,
            shared,
            idle_rx,
            inspector,
        } = self;

        shared.state.lock().mark_started(SystemTime::now());

        let (jobs_tx, jobs_rx) = mpsc::channel(shared.config.backlog);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut tasks = JoinSet::new();
        tasks.spawn(generate_jobs(Arc::clone(&shared), jobs_tx, inspector));
        tasks.spawn(dispatch_loop(Arc::clone(&shared), idle_rx, jobs_rx));
        tasks.spawn(sweep_loop(Arc::clone(&shared)));
        tasks.spawn(progress_loop(Arc::clone(&shared)));
        tasks.spawn(register_loop(
            Arc::clone(&shared),
            events_rx,
            events_tx.clone(),
        ));
        tasks.spawn(accept_loop(Arc::clone(&shared), listener, events_tx));

        shared.shutdown.cancelled().await;

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Coordinator task failed: {e}");
            }
        }

        let report = shared.state.lock().report();
        Ok(report)
    }
}

/// Status queries and operator actions on a running coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    shared: Arc<Shared>,
}

impl CoordinatorHandle {
    /// Connected sessions, oldest first.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.shared.state.lock().session_infos()
    }

    /// Jobs currently held by workers, ordered by offset.
    pub fn pending_jobs(&self) -> Vec<JobInfo> {
        self.shared.state.lock().pending_infos()
    }

    /// Snapshot of the run so far.
    pub fn report(&self) -> Report {
        self.shared.state.lock().report()
    }

    /// Kicks the session whose full or short id is `id`.
    ///
    /// Returns `false` if no session matches.
    pub fn kick(&self, id: &str) -> bool {
        let state = self.shared.state.lock();
        let Some(client) = state.find_session(id) else {
            return false;
        };
        tracing::info!("Kicking {}", client.short());
        increment_clients_kicked();
        state.kick(client, self.shared.max_frame_bytes())
    }

    /// Kicks every session. Returns how many were kicked.
    pub fn kick_all(&self) -> usize {
        let kicked = self
            .shared
            .state
            .lock()
            .kick_all(self.shared.max_frame_bytes());
        for _ in 0..kicked {
            increment_clients_kicked();
        }
        kicked
    }

    /// Ends the run. Safe to call any number of times.
    pub fn terminate(&self, reason: TerminationReason) {
        self.shared.terminate(reason);
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.is_terminated()
    }
}
