use crate::server::{
    service::{Shared, handler::receive_loop},
    session::{Outbound, Session, new_client_id, write_loop},
    telemetry::{decrement_clients_connected, increment_clients_connected, increment_jobs_requeued},
};
use core::time::Duration;
use futures::StreamExt;
use keyspan_core::{ClientId, MessageCodec};
use std::{net::SocketAddr, sync::Arc};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinSet,
};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};

/// How long connections may linger after termination so their Leave frame
/// gets written.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Changes to the session set, applied by [`register_loop`] only.
#[derive(Debug)]
pub enum Event {
    Register { stream: TcpStream, addr: SocketAddr },
    Unregister(ClientId),
}

/// Accepts connections until shutdown and hands each to the register loop.
pub async fn accept_loop(
    shared: Arc<Shared>,
    listener: TcpListener,
    events: mpsc::UnboundedSender<Event>,
) {
    let mut incoming = TcpListenerStream::new(listener);
    loop {
        let next = tokio::select! {
            biased;
            () = shared.shutdown.cancelled() => break,
            next = incoming.next() => next,
        };

        match next {
            Some(Ok(stream)) => {
                let addr = match stream.peer_addr() {
                    Ok(addr) => addr,
                    Err(e) => {
                        tracing::warn!("Dropping connection without a peer address: {e}");
                        continue;
                    }
                };
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!("Unable to set TCP_NODELAY for {addr}: {e}");
                }
                if events.send(Event::Register { stream, addr }).is_err() {
                    break;
                }
            }
            Some(Err(e)) => tracing::warn!("Accept failed: {e}"),
            None => break,
        }
    }
    tracing::debug!("Accept loop stopped");
}

/// Sole owner of session-set mutation.
///
/// After shutdown it keeps applying unregistrations until every connection
/// task has finished or [`SHUTDOWN_GRACE`] runs out.
pub async fn register_loop(
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<Event>,
    events_tx: mpsc::UnboundedSender<Event>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            () = shared.shutdown.cancelled() => break,
            Some(event) = events.recv() => {
                apply(&shared, event, &events_tx, &mut connections);
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    let drain = async {
        while !connections.is_empty() {
            tokio::select! {
                Some(event) = events.recv() => {
                    apply(&shared, event, &events_tx, &mut connections);
                }
                Some(_) = connections.join_next() => {}
            }
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!(
            "{} connection(s) still open after {:?}, dropping them",
            connections.len(),
            SHUTDOWN_GRACE
        );
        connections.abort_all();
    }
    tracing::debug!("Register loop stopped");
}

fn apply(
    shared: &Arc<Shared>,
    event: Event,
    events_tx: &mpsc::UnboundedSender<Event>,
    connections: &mut JoinSet<()>,
) {
    match event {
        Event::Register { stream, addr } => {
            let id = new_client_id();
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let token = CancellationToken::new();

            {
                let mut state = shared.state.lock();
                // Checked under the lock so a concurrent terminate either
                // kicks this session or sees it refused.
                if state.is_finished() {
                    tracing::debug!("Refusing {addr}: shutting down");
                    return;
                }
                state.register(Session::new(id, addr, outbound_tx, token.clone()));
            }
            increment_clients_connected();
            tracing::info!("Client {} connected from {addr}", id.short());

            connections.spawn(serve_connection(
                Arc::clone(shared),
                id,
                stream,
                outbound_rx,
                token,
                events_tx.clone(),
            ));
        }
        Event::Unregister(id) => {
            let requeued = shared.state.lock().unregister(id);
            decrement_clients_connected();
            tracing::info!("Client {} disconnected", id.short());

            if let Some(job) = requeued {
                tracing::warn!("Rescheduling job {} of {}", job.short(), id.short());
                increment_jobs_requeued();
                shared.retry_ready.notify_one();
            }
        }
    }
}

/// Runs one connection: a writer task plus the receive loop on this task.
async fn serve_connection(
    shared: Arc<Shared>,
    client: ClientId,
    stream: TcpStream,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    token: CancellationToken,
    events: mpsc::UnboundedSender<Event>,
) {
    let max_frame_bytes = shared.max_frame_bytes();
    let (read, write) = stream.into_split();
    let reader = FramedRead::new(read, MessageCodec::new(max_frame_bytes));
    let writer = FramedWrite::new(write, MessageCodec::new(max_frame_bytes));

    let writer = tokio::spawn(write_loop(client, outbound_rx, writer, token.clone()));
    receive_loop(&shared, client, reader, &token).await;
    token.cancel();

    // Dropping the session closes its outbound channel, which lets the
    // writer flush whatever is queued and stop.
    let _ = events.send(Event::Unregister(client));
    if let Err(e) = writer.await {
        tracing::error!("Writer for {} failed: {e}", client.short());
    }
}
