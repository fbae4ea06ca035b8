use crate::server::service::Shared;
use keyspan_core::arith;
use std::{sync::Arc, time::SystemTime};
use tokio::time::MissedTickBehavior;

/// Logs progress every progress interval and terminates the run once
/// [`State::evaluate`](crate::server::state::State::evaluate) finds a reason.
pub async fn progress_loop(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(shared.config.progress_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = shared.shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let (reason, finished, total, clients, pending) = {
            let state = shared.state.lock();
            (
                state.evaluate(SystemTime::now()),
                state.finished_jobs().clone(),
                state.total_jobs().clone(),
                state.sessions().count(),
                state.pending_len(),
            )
        };
        tracing::info!(
            "Progress: {finished}/{total} ({:.2}%), {clients} client(s) connected, {pending} job(s) pending",
            arith::percentage(&total, &finished)
        );

        if let Some(reason) = reason {
            shared.terminate(reason);
            break;
        }
    }
    tracing::debug!("Progress loop stopped");
}
