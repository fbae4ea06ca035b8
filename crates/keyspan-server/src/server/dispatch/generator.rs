use crate::server::{
    config::{ConfigError, TargetSource},
    inspector::TargetInspector,
    report::TerminationReason,
    service::Shared,
};
use bytes::Bytes;
use core::time::Duration;
use keyspan_core::{GenerationParams, Job, Position, Target, arith};
use std::{path::Path, sync::Arc, time::SystemTime};
use tokio::sync::mpsc;

/// Interval between checks for a capture that does not exist yet.
pub const TARGET_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Lazily splits `offset..size` into `(offset, count)` slices of at most
/// `job_size` candidates.
///
/// Only the cursor is kept in memory, so the plan for a keyspace of any size
/// costs the same.
#[derive(Clone, Debug)]
pub struct JobPlan {
    next_offset: Position,
    remaining: Position,
    job_size: u64,
    total: Position,
}

impl JobPlan {
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOffset`] if `offset` is not below
    /// `size`, and [`ConfigError::ZeroJobSize`] for an empty job size.
    pub fn new(size: &Position, offset: &Position, job_size: u64) -> Result<Self, ConfigError> {
        if job_size == 0 {
            return Err(ConfigError::ZeroJobSize);
        }
        let invalid = || ConfigError::InvalidOffset {
            offset: offset.clone(),
            size: size.clone(),
        };
        if !arith::lt(offset, size) {
            return Err(invalid());
        }
        let remaining = arith::sub(size, offset).map_err(|_| invalid())?;

        let step = Position::from(job_size);
        let mut total = arith::div(&remaining, &step).map_err(|_| ConfigError::ZeroJobSize)?;
        let rest = arith::modulo(&remaining, &step).map_err(|_| ConfigError::ZeroJobSize)?;
        if rest != Position::from(0u32) {
            total = arith::add(&total, &Position::from(1u32));
        }

        Ok(Self {
            next_offset: offset.clone(),
            remaining,
            job_size,
            total,
        })
    }

    /// Number of jobs the plan yields in total.
    pub fn total(&self) -> &Position {
        &self.total
    }
}

impl Iterator for JobPlan {
    type Item = (Position, u64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Position::from(0u32) {
            return None;
        }
        // Only the final slice can be short, and then it fits a u64.
        let count = u64::try_from(&self.remaining).map_or(self.job_size, |left| left.min(self.job_size));
        let step = Position::from(count);

        let offset = self.next_offset.clone();
        self.next_offset = arith::add(&self.next_offset, &step);
        self.remaining = arith::sub(&self.remaining, &step).ok()?;
        Some((offset, count))
    }
}

/// Produces every job of the run into `jobs`.
///
/// Blocks while the queue is full. Stops early at the job limit, the time
/// limit or shutdown; a target that cannot be loaded or a job outside the
/// keyspace terminates the run.
#[tracing::instrument(skip_all)]
pub async fn generate_jobs(
    shared: Arc<Shared>,
    jobs: mpsc::Sender<Job>,
    inspector: Arc<dyn TargetInspector>,
) {
    let target = match load_target(&shared, inspector.as_ref()).await {
        Ok(Some(target)) => target,
        Ok(None) => return,
        Err(e) => {
            shared.terminate(TerminationReason::Fatal(e.to_string()));
            return;
        }
    };

    let config = &shared.config;
    let plan = match config
        .keyspace()
        .and_then(|keyspace| JobPlan::new(keyspace.size(), &config.offset, config.job_size))
    {
        Ok(plan) => plan,
        Err(e) => {
            shared.terminate(TerminationReason::Fatal(e.to_string()));
            return;
        }
    };

    tracing::info!(
        "Generating {} job(s) of up to {} candidates for {}",
        plan.total(),
        config.job_size,
        target.label()
    );
    {
        let mut state = shared.state.lock();
        state.set_total_jobs(plan.total().clone());
        state.set_target_label(target.label());
    }

    for (offset, count) in plan {
        let params = GenerationParams {
            alphabet: config.alphabet.clone(),
            length: config.length,
            offset,
            count,
        };
        let job = match Job::new(target.clone(), params) {
            Ok(job) => job,
            Err(e) => {
                shared.terminate(TerminationReason::Fatal(format!(
                    "unable to create job: {e}"
                )));
                return;
            }
        };

        tokio::select! {
            biased;
            () = shared.shutdown.cancelled() => return,
            sent = jobs.send(job) => if sent.is_err() {
                return;
            },
        }

        let mut state = shared.state.lock();
        let generated = state.record_generated();
        if let Some(max) = config.max_jobs {
            if arith::ge(generated, &Position::from(max)) {
                tracing::info!("Job limit of {max} reached, stopping generation");
                state.mark_max_jobs_reached();
                break;
            }
        }
        if state.time_exceeded(SystemTime::now()) {
            tracing::info!("Time limit reached, stopping generation");
            break;
        }
    }

    shared.state.lock().mark_generation_complete();
    tracing::debug!("Generation complete");
}

/// Resolves the configured target, waiting for a capture if configured to.
///
/// Returns `None` if shutdown fires while waiting.
async fn load_target(
    shared: &Shared,
    inspector: &dyn TargetInspector,
) -> Result<Option<Target>, ConfigError> {
    match &shared.config.target {
        TargetSource::Digest { kind, digest, salt } => {
            Target::hash(*kind, digest.clone(), salt.clone())
                .map(Some)
                .ok_or_else(|| ConfigError::InvalidTarget {
                    reason: format!("{kind} is not a hash kind"),
                })
        }
        TargetSource::Capture(path) => {
            if shared.config.wait_for_target && !wait_for(shared, path).await {
                return Ok(None);
            }
            let info = inspector
                .inspect(path)
                .map_err(|e| ConfigError::InvalidTarget {
                    reason: e.to_string(),
                })?;
            let capture = tokio::fs::read(path)
                .await
                .map_err(|source| ConfigError::UnreadableTarget {
                    path: path.clone(),
                    source,
                })?;
            Ok(Some(Target::Wpa2 {
                capture: Bytes::from(capture),
                essid: info.essid,
                bssid: info.bssid,
            }))
        }
    }
}

/// Polls until `path` exists. Returns `false` on shutdown.
async fn wait_for(shared: &Shared, path: &Path) -> bool {
    let mut announced = false;
    loop {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return true;
        }
        if !announced {
            tracing::info!("Waiting for {} to become available", path.display());
            announced = true;
        }
        tokio::select! {
            () = shared.shutdown.cancelled() => return false,
            () = tokio::time::sleep(TARGET_POLL_INTERVAL) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_covers_the_keyspace_in_order() {
        let plan = JobPlan::new(&Position::from(4u32), &Position::from(0u32), 2).unwrap();
        assert_eq!(plan.total(), &Position::from(2u32));
        let slices: Vec<_> = plan.collect();
        assert_eq!(
            slices,
            vec![(Position::from(0u32), 2), (Position::from(2u32), 2)]
        );
    }

    #[test]
    fn final_slice_is_short() {
        let plan = JobPlan::new(&Position::from(1000u32), &Position::from(995u32), 3).unwrap();
        assert_eq!(plan.total(), &Position::from(2u32));
        let slices: Vec<_> = plan.collect();
        assert_eq!(
            slices,
            vec![(Position::from(995u32), 3), (Position::from(998u32), 2)]
        );
    }

    #[test]
    fn plan_handles_keyspaces_beyond_u64() {
        let size = arith::pow(&Position::from(62u32), 20);
        let start = arith::sub(&size, &Position::from(5u32)).unwrap();
        let plan = JobPlan::new(&size, &start, u64::MAX).unwrap();
        assert_eq!(plan.total(), &Position::from(1u32));
        let slices: Vec<_> = plan.collect();
        assert_eq!(slices, vec![(start, 5)]);

        let huge = JobPlan::new(&size, &Position::from(0u32), 1_000_000).unwrap();
        assert!(arith::gt(huge.total(), &Position::from(u64::MAX)));
    }

    #[test]
    fn invalid_plans_are_rejected() {
        assert!(matches!(
            JobPlan::new(&Position::from(10u32), &Position::from(10u32), 1),
            Err(ConfigError::InvalidOffset { .. })
        ));
        assert!(matches!(
            JobPlan::new(&Position::from(10u32), &Position::from(0u32), 0),
            Err(ConfigError::ZeroJobSize)
        ));
    }
}
