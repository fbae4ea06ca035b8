//! Moving jobs from generation to workers.
//!
//! ## Structure
//!
//! - [`generator`] - splits the keyspace into jobs and feeds the bounded job
//!   queue, pausing while it is full.
//! - [`sweeper`] - reclaims jobs from vanished sessions and kicks workers
//!   that sit on a job past its timeout.
//! - [`progress`] - logs progress and decides when the run is over.
//!
//! The dispatch loop itself lives here. Jobs come from two places: the retry
//! queue in [`State`](crate::server::state::State), which holds reclaimed
//! work and always goes first, and the bounded channel fed by the generator.

pub mod generator;
pub mod progress;
pub mod sweeper;

use crate::server::{
    report::TerminationReason,
    service::Shared,
    state::Assignment,
    telemetry::increment_jobs_dispatched,
};
use keyspan_core::{ClientId, Frame, Job, Message, proto::encode_frame};
use std::{sync::Arc, time::SystemTime};
use tokio::sync::mpsc;

/// Pairs idle clients with jobs until shutdown.
///
/// Waits for an idle client first, then for a job. A job that can no longer
/// be placed with its client (it disconnected in the meantime) goes back to
/// the head of the retry queue for the next idle client.
#[tracing::instrument(skip_all)]
pub async fn dispatch_loop(
    shared: Arc<Shared>,
    mut idle: mpsc::UnboundedReceiver<ClientId>,
    mut jobs: mpsc::Receiver<Job>,
) {
    let mut generating = true;
    loop {
        let client = tokio::select! {
            biased;
            () = shared.shutdown.cancelled() => break,
            client = idle.recv() => match client {
                Some(client) => client,
                None => break,
            },
        };

        let Some(job) = next_job(&shared, &mut jobs, &mut generating).await else {
            break;
        };
        if shared.is_terminated() {
            tracing::debug!("Dropping job {}: shutting down", job.short_id());
            break;
        }
        dispatch(&shared, client, job);
    }
    tracing::debug!("Dispatch loop stopped");
}

/// The next job to hand out, or `None` on shutdown.
///
/// Reclaimed jobs take priority over fresh ones. Once the generator is done
/// this only waits on the retry queue.
async fn next_job(
    shared: &Shared,
    jobs: &mut mpsc::Receiver<Job>,
    generating: &mut bool,
) -> Option<Job> {
    loop {
        if let Some(job) = shared.state.lock().pop_retry() {
            return Some(job);
        }

        tokio::select! {
            biased;
            () = shared.shutdown.cancelled() => return None,
            () = shared.retry_ready.notified() => {}
            job = jobs.recv(), if *generating => match job {
                Some(job) => return Some(job),
                None => *generating = false,
            },
        }
    }
}

/// Assigns `job` to `client` and queues the Task frame.
///
/// The job is in the pending map before the frame is built, so a sweep can
/// never find it in neither place while it is still owed to someone.
fn dispatch(shared: &Shared, client: ClientId, job: Job) {
    let assignment = shared
        .state
        .lock()
        .assign(client, job, SystemTime::now());
    let outgoing = match assignment {
        Assignment::Assigned { outgoing } => outgoing,
        Assignment::Rejected(job) => {
            tracing::debug!(
                "Client {} cannot take job {}, putting it back",
                client.short(),
                job.short_id()
            );
            shared.state.lock().push_retry_front(job);
            return;
        }
    };

    let job_id = outgoing.id();
    let with_target = outgoing.target().is_some();
    let body = match encode_frame(&Frame::new(Message::Task(outgoing)), shared.max_frame_bytes()) {
        Ok(body) => body,
        Err(e) => {
            shared.terminate(TerminationReason::Fatal(format!(
                "job {} cannot be transmitted: {e}",
                job_id.short()
            )));
            return;
        }
    };

    let queued = shared
        .state
        .lock()
        .session(client)
        .is_some_and(|session| session.send_encoded(body));
    if queued {
        increment_jobs_dispatched();
        tracing::debug!(
            "Dispatched job {} to {}{}",
            job_id.short(),
            client.short(),
            if with_target { "" } else { " (without payload)" }
        );
    } else {
        // The disconnect path requeues the job once it unregisters the
        // session.
        tracing::debug!("Client {} left before job {} was sent", client.short(), job_id.short());
    }
}
