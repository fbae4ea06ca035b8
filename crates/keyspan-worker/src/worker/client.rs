//! The worker side of the protocol.
//!
//! ```text
//! connect -> send Hello -> await Ack -> send Idle
//!   loop: recv Task -> crack -> send Finished | ClientError
//! recv Leave or lose the socket -> stop
//! ```
//!
//! After a Finished the coordinator queues the worker again on its own, so
//! Idle is only sent once per connection.

use crate::worker::{
    config::WorkerConfig,
    cracker::{CrackError, Cracker},
};
use futures::{SinkExt, StreamExt};
use keyspan_core::{ClientError, Frame, Job, JobId, JobResult, Message, MessageCodec, Target};
use std::sync::Arc;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_util::codec::Framed;

#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    #[error("unable to reach {addr} after {attempts} attempt(s): {source}")]
    Connect {
        addr: String,
        attempts: u32,
        source: std::io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] keyspan_core::Error),
}

/// How a connection ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// This worker found the password.
    Found(String),
    /// The coordinator asked this worker to leave.
    Dismissed,
    /// The coordinator closed the connection.
    Disconnected,
}

pub struct Worker<C> {
    config: WorkerConfig,
    cracker: Arc<C>,
    /// Target of the last task that carried one.
    target: Option<Target>,
}

impl<C: Cracker> Worker<C> {
    pub fn new(config: WorkerConfig, cracker: C) -> Self {
        Self {
            config,
            cracker: Arc::new(cracker),
            target: None,
        }
    }

    /// Connects and serves the coordinator until the session ends.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Connect`] once every attempt failed, and
    /// [`WorkerError::Protocol`] if the connection breaks mid-stream.
    pub async fn run(&mut self) -> Result<Outcome, WorkerError> {
        let stream = connect(&self.config).await?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Unable to set TCP_NODELAY: {e}");
        }
        self.serve(stream).await
    }

    /// Speaks the protocol over an established connection.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Protocol`] on a transport failure.
    pub async fn serve<T>(&mut self, io: T) -> Result<Outcome, WorkerError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut framed = Framed::new(io, MessageCodec::new(self.config.max_frame_bytes));

        send(&mut framed, Message::Hello).await?;
        loop {
            match recv(&mut framed).await? {
                Some(Message::Ack) => break,
                Some(Message::Leave) => return Ok(Outcome::Dismissed),
                Some(other) => tracing::warn!("Ignoring {} before Ack", other.name()),
                None => return Ok(Outcome::Disconnected),
            }
        }
        tracing::info!("Connected, waiting for work");

        send(&mut framed, Message::Idle).await?;
        loop {
            let job = match recv(&mut framed).await? {
                Some(Message::Task(job)) => job,
                Some(Message::Leave) => {
                    tracing::info!("Coordinator asked us to leave");
                    return Ok(Outcome::Dismissed);
                }
                Some(other) => {
                    tracing::warn!("Ignoring unexpected {}", other.name());
                    continue;
                }
                None => return Ok(Outcome::Disconnected),
            };

            match self.work(job).await {
                Ok(result) => {
                    let found = result.success.then(|| result.candidate.clone());
                    send(&mut framed, Message::Finished(result)).await?;
                    if let Some(password) = found {
                        tracing::info!("Cracked the password: {password}");
                        return Ok(Outcome::Found(password));
                    }
                }
                Err(error) => {
                    tracing::error!("Unable to work on job: {}", error.reason);
                    send(&mut framed, Message::ClientError(error)).await?;
                }
            }
        }
    }

    /// Runs one job on a blocking thread.
    async fn work(&mut self, job: Job) -> Result<JobResult, ClientError> {
        let id = job.id();
        let job = self.resolve_target(job)?;
        tracing::info!(
            "Working on {} ({}, {} candidates)",
            job.short_id(),
            job.kind(),
            job.count()
        );

        let cracker = Arc::clone(&self.cracker);
        let joined = tokio::task::spawn_blocking(move || cracker.crack(&job)).await;
        match joined {
            Ok(Ok(Some(candidate))) => Ok(JobResult::found(id, candidate)),
            Ok(Ok(None)) => {
                tracing::info!("No match in {}", id.short());
                Ok(JobResult::exhausted(id))
            }
            Ok(Err(e)) => Err(client_error(id, &e)),
            Err(e) => Err(ClientError {
                job_id: Some(id),
                reason: format!("cracker panicked: {e}"),
            }),
        }
    }

    /// Caches a task's target, or fills in the cached one when the task
    /// omitted it.
    fn resolve_target(&mut self, job: Job) -> Result<Job, ClientError> {
        if let Some(target) = job.target() {
            self.target = Some(target.clone());
            return Ok(job);
        }
        let id = job.id();
        match &self.target {
            Some(target) => job
                .with_target(target.clone())
                .map_err(|e| client_error(id, &e)),
            None => Err(client_error(id, &CrackError::MissingTarget)),
        }
    }
}

fn client_error(id: JobId, error: &dyn core::fmt::Display) -> ClientError {
    ClientError {
        job_id: Some(id),
        reason: error.to_string(),
    }
}

/// Opens the connection, retrying up to the configured number of attempts.
///
/// # Errors
///
/// Returns [`WorkerError::Connect`] with the last OS error once every
/// attempt failed.
pub async fn connect(config: &WorkerConfig) -> Result<TcpStream, WorkerError> {
    let mut attempt = 1;
    loop {
        match TcpStream::connect(&config.server_addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) if attempt < config.attempts => {
                tracing::warn!(
                    "Attempt {attempt}/{} to reach {} failed: {e}, retrying in {:?}",
                    config.attempts,
                    config.server_addr,
                    config.retry_delay
                );
                tokio::time::sleep(config.retry_delay).await;
                attempt += 1;
            }
            Err(source) => {
                return Err(WorkerError::Connect {
                    addr: config.server_addr.clone(),
                    attempts: attempt,
                    source,
                });
            }
        }
    }
}

async fn send<T>(framed: &mut Framed<T, MessageCodec>, message: Message) -> Result<(), WorkerError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    SinkExt::<Frame>::send(framed, Frame::new(message)).await?;
    Ok(())
}

/// Next well-formed message, skipping frames that fail to decode. `None`
/// once the coordinator closes the connection.
async fn recv<T>(framed: &mut Framed<T, MessageCodec>) -> Result<Option<Message>, WorkerError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        match framed.next().await {
            None => return Ok(None),
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(Err(e))) => tracing::warn!("Dropping malformed frame: {e}"),
            Some(Ok(Ok(frame))) => return Ok(Some(frame.message)),
        }
    }
}
