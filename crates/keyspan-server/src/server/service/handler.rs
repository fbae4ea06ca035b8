//! Per-client message handling.
//!
//! [`receive_loop`] decodes frames from one worker and routes each message to
//! its handler. Handlers never fail: a misbehaving worker is either ignored
//! or kicked, and the run carries on without it.

use crate::server::{
    report::TerminationReason,
    service::Shared,
    state::Completion,
    telemetry::{
        increment_clients_kicked, increment_jobs_finished, increment_protocol_errors,
        record_job_duration,
    },
};
use core::ops::ControlFlow;
use futures::StreamExt;
use keyspan_core::{ClientError, ClientId, Frame, JobResult, Message, MessageCodec};
use std::time::SystemTime;
use tokio::io::AsyncRead;
use tokio_util::{codec::FramedRead, sync::CancellationToken};

/// Reads frames until the peer disconnects, the transport fails or `token`
/// is cancelled.
///
/// A frame that fails to decode is dropped and the loop continues; only a
/// broken stream (including an oversized length prefix) ends it.
#[tracing::instrument(skip_all, fields(client = %client.short()))]
pub async fn receive_loop<R>(
    shared: &Shared,
    client: ClientId,
    mut reader: FramedRead<R, MessageCodec>,
    token: &CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            () = token.cancelled() => break,
            next = reader.next() => next,
        };

        match next {
            None => {
                tracing::debug!("Connection closed by peer");
                break;
            }
            Some(Err(e)) => {
                tracing::warn!("Read failed: {e}");
                break;
            }
            Some(Ok(Err(e))) => {
                tracing::warn!("Dropping malformed frame: {e}");
                increment_protocol_errors();
            }
            Some(Ok(Ok(frame))) => {
                if handle(shared, client, frame).is_break() {
                    break;
                }
            }
        }
    }
}

/// Routes one message. `Break` ends the connection.
pub fn handle(shared: &Shared, client: ClientId, frame: Frame) -> ControlFlow<()> {
    tracing::trace!("Received {} ({})", frame.message.name(), frame.id.short());
    match frame.message {
        Message::Hello => on_hello(shared, client),
        Message::Idle => on_idle(shared, client),
        Message::Finished(result) => on_finished(shared, client, &result),
        Message::ClientError(error) => on_client_error(shared, client, &error),
        Message::Leave => {
            tracing::info!("Client is leaving");
            ControlFlow::Break(())
        }
        message @ (Message::Ack | Message::Task(_)) => {
            tracing::warn!("Ignoring unexpected {} from a worker", message.name());
            increment_protocol_errors();
            ControlFlow::Continue(())
        }
    }
}

fn on_hello(shared: &Shared, client: ClientId) -> ControlFlow<()> {
    let mut state = shared.state.lock();
    let Some(session) = state.session_mut(client) else {
        return ControlFlow::Break(());
    };
    if session.validated {
        tracing::warn!("Repeated Hello");
    }
    session.validated = true;
    session.send(Message::Ack, shared.max_frame_bytes());
    tracing::debug!("Validated");
    ControlFlow::Continue(())
}

fn on_idle(shared: &Shared, client: ClientId) -> ControlFlow<()> {
    {
        let mut state = shared.state.lock();
        let Some(session) = state.session(client) else {
            return ControlFlow::Break(());
        };
        if !session.validated {
            tracing::warn!("Idle before Hello, kicking");
            increment_protocol_errors();
            increment_clients_kicked();
            session.kick(shared.max_frame_bytes());
            return ControlFlow::Break(());
        }
        if state.has_pending(client) {
            tracing::warn!("Idle while holding a job, ignoring");
            increment_protocol_errors();
            return ControlFlow::Continue(());
        }
        if !state.mark_queued(client) {
            tracing::debug!("Repeated Idle while waiting for a job, ignoring");
            return ControlFlow::Continue(());
        }
    }

    let _ = shared.idle_tx.send(client);
    ControlFlow::Continue(())
}

fn on_finished(shared: &Shared, client: ClientId, result: &JobResult) -> ControlFlow<()> {
    let completion = shared.state.lock().complete(client, result, SystemTime::now());
    match completion {
        Completion::NotPending => {
            tracing::warn!(
                "Result for job {} without a pending job, ignoring",
                result.job_id.short()
            );
            increment_protocol_errors();
        }
        Completion::Mismatch { pending } => {
            tracing::warn!(
                "Result for job {} while holding {}, ignoring",
                result.job_id.short(),
                pending.short()
            );
            increment_protocol_errors();
        }
        Completion::Finished { job, success, took } => {
            increment_jobs_finished();
            if let Some(took) = took {
                record_job_duration(took.as_secs_f64() * 1000.0);
            }

            if success {
                tracing::info!("Password found in job {}", job.short());
                shared.terminate(TerminationReason::Success);
            } else {
                tracing::debug!("Finished job {}", job.short());
                if shared.state.lock().mark_queued(client) {
                    let _ = shared.idle_tx.send(client);
                }
            }
        }
    }
    ControlFlow::Continue(())
}

fn on_client_error(shared: &Shared, client: ClientId, error: &ClientError) -> ControlFlow<()> {
    let job = error
        .job_id
        .map_or_else(|| String::from("-"), |id| id.short());
    let state = shared.state.lock();
    if !state.has_pending(client) {
        tracing::warn!("Error without a pending job (job {job}): {}", error.reason);
        increment_protocol_errors();
        return ControlFlow::Continue(());
    }

    tracing::warn!("Error on job {job}: {}, kicking", error.reason);
    increment_clients_kicked();
    state.kick(client, shared.max_frame_bytes());
    ControlFlow::Break(())
}
