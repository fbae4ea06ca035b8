//! Server-side bookkeeping for one connected worker.
//!
//! All writes to a connection go through its [`Session::outbound`] channel,
//! drained by a single [`write_loop`] task, so frames from the dispatcher,
//! a kick or a shutdown broadcast can never interleave on the socket.

use bytes::Bytes;
use futures::SinkExt;
use keyspan_core::{
    ClientId, Frame, JobId, JobInfo, Message, MessageCodec, Position, proto::encode_frame,
};
use std::{net::SocketAddr, time::SystemTime};
use tokio::{io::AsyncWrite, sync::mpsc};
use tokio_util::{codec::FramedWrite, sync::CancellationToken};

/// Reserved short-id prefix; ids starting with it are never handed out.
pub const RESERVED_PREFIX: &str = "ffffff";

/// Mints a client id whose short form does not start with
/// [`RESERVED_PREFIX`].
pub fn new_client_id() -> ClientId {
    loop {
        let id = ClientId::new();
        if !id.short().starts_with(RESERVED_PREFIX) {
            return id;
        }
    }
}

/// Work for a connection's writer task.
#[derive(Debug)]
pub enum Outbound {
    /// A frame body already checked against the frame limit.
    Frame(Bytes),
    /// Flush, shut down the write half and stop.
    Close,
}

#[derive(Debug)]
pub struct Session {
    pub id: ClientId,
    pub addr: SocketAddr,
    /// Set once the worker's Hello was acknowledged.
    pub validated: bool,
    pub connected_at: SystemTime,
    pub assigned: u64,
    pub finished: u64,
    pub tried: Position,
    pub current: Option<JobId>,
    pub history: Vec<JobInfo>,
    /// Set while the client sits in the dispatcher's idle queue.
    pub queued: bool,
    outbound: mpsc::UnboundedSender<Outbound>,
    token: CancellationToken,
}

impl Session {
    pub fn new(
        id: ClientId,
        addr: SocketAddr,
        outbound: mpsc::UnboundedSender<Outbound>,
        token: CancellationToken,
    ) -> Self {
        Self {
            id,
            addr,
            validated: false,
            connected_at: SystemTime::now(),
            assigned: 0,
            finished: 0,
            tried: Position::from(0u32),
            current: None,
            history: Vec::new(),
            queued: false,
            outbound,
            token,
        }
    }

    /// A worker that finished a job already holds the target.
    pub const fn is_seasoned(&self) -> bool {
        self.finished > 0
    }

    /// Queues a pre-encoded frame. Returns `false` if the writer is gone.
    pub fn send_encoded(&self, body: Bytes) -> bool {
        self.outbound.send(Outbound::Frame(body)).is_ok()
    }

    /// Encodes and queues a control message.
    pub fn send(&self, message: Message, max_frame_bytes: usize) -> bool {
        match encode_frame(&Frame::new(message), max_frame_bytes) {
            Ok(body) => self.send_encoded(body),
            Err(e) => {
                tracing::error!("Unable to encode message for {}: {e}", self.id.short());
                false
            }
        }
    }

    /// Asks the worker to leave, then closes the connection.
    ///
    /// The Leave frame is queued ahead of the close, so it is written unless
    /// the socket is already broken.
    pub fn kick(&self, max_frame_bytes: usize) {
        self.send(Message::Leave, max_frame_bytes);
        let _ = self.outbound.send(Outbound::Close);
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.short(),
            addr: self.addr,
            validated: self.validated,
            connected_at: self.connected_at,
            assigned: self.assigned,
            finished: self.finished,
            tried: self.tried.clone(),
            current_job: self.current.map(|id| id.short()),
            history: self.history.clone(),
        }
    }
}

/// Snapshot of a [`Session`] for status queries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    pub addr: SocketAddr,
    pub validated: bool,
    pub connected_at: SystemTime,
    pub assigned: u64,
    pub finished: u64,
    pub tried: Position,
    pub current_job: Option<String>,
    /// Jobs this worker completed, oldest first.
    pub history: Vec<JobInfo>,
}

/// Drains `rx` into the socket until closed.
///
/// A write failure cancels `token`, which ends the connection's receive loop
/// and with it the session.
pub async fn write_loop<W>(
    client: ClientId,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    mut writer: FramedWrite<W, MessageCodec>,
    token: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Frame(body) => {
                if let Err(e) = writer.send(body).await {
                    tracing::warn!("Write to {} failed: {e}", client.short());
                    token.cancel();
                    break;
                }
            }
            Outbound::Close => break,
        }
    }

    if let Err(e) = SinkExt::<Bytes>::close(&mut writer).await {
        tracing::debug!("Closing connection to {} failed: {e}", client.short());
    }
    tracing::trace!("Writer for {} stopped", client.short());
}
