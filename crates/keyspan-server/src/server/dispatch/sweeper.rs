use crate::server::{
    service::Shared,
    state::Sweep,
    telemetry::{increment_clients_kicked, increment_jobs_requeued},
};
use std::{sync::Arc, time::SystemTime};
use tokio::time::MissedTickBehavior;

/// Runs [`sweep_once`] every sweep interval until shutdown.
pub async fn sweep_loop(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(shared.config.sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = shared.shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        sweep_once(&shared, SystemTime::now());
    }
    tracing::debug!("Sweeper stopped");
}

/// One pass over the pending map.
///
/// Jobs whose session is gone go back on the retry queue. Sessions that held
/// a job longer than the job timeout are kicked; their job follows once the
/// disconnect is processed.
pub fn sweep_once(shared: &Shared, now: SystemTime) -> Sweep {
    let sweep = {
        let mut state = shared.state.lock();
        let sweep = state.sweep(now, shared.config.job_timeout);
        for client in &sweep.timed_out {
            tracing::warn!("Client {} timed out on its job, kicking", client.short());
            increment_clients_kicked();
            state.kick(*client, shared.max_frame_bytes());
        }
        sweep
    };

    for job in &sweep.requeued {
        tracing::warn!("Owner of job {} is gone, rescheduling", job.short());
        increment_jobs_requeued();
    }
    if !sweep.requeued.is_empty() {
        shared.retry_ready.notify_one();
    }
    sweep
}
