use core::time::Duration;
use futures::{SinkExt, StreamExt};
use keyspan_core::{
    Alphabet, ClientError, Frame, JobKind, JobResult, Message, MessageCodec, Position, Target,
};
use keyspan_server::{
    Coordinator, CoordinatorHandle, Report, ServerConfig, ServerError, TargetSource,
    TerminationReason,
};
use keyspan_worker::{DigestCracker, Outcome, Worker, WorkerConfig, WorkerError};
use md5::Md5;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use tokio::{net::TcpStream, task::JoinHandle, time::timeout};
use tokio_util::codec::Framed;

const DEADLINE: Duration = Duration::from_secs(20);

type RawClient = Framed<TcpStream, MessageCodec>;

fn hex<D: Digest>(input: &str) -> String {
    D::digest(input.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn sha256_hex(input: &str) -> String {
    hex::<Sha256>(input)
}

fn config(target: TargetSource, alphabet: &str, length: u32, job_size: u64) -> ServerConfig {
    let mut config = ServerConfig::new(target);
    config.listen_addr = "127.0.0.1:0".to_string();
    config.alphabet = Alphabet::new(alphabet).unwrap();
    config.length = length;
    config.job_size = job_size;
    config.sweep_interval = Duration::from_millis(50);
    config.progress_interval = Duration::from_millis(50);
    config
}

fn digest_config(password: &str, alphabet: &str, length: u32, job_size: u64) -> ServerConfig {
    let target = TargetSource::parse_digest(JobKind::Sha256, &sha256_hex(password)).unwrap();
    config(target, alphabet, length, job_size)
}

async fn start(
    config: ServerConfig,
) -> (
    SocketAddr,
    CoordinatorHandle,
    JoinHandle<Result<Report, ServerError>>,
) {
    let coordinator = Coordinator::bind(config).await.unwrap();
    let addr = coordinator.local_addr().unwrap();
    let handle = coordinator.handle();
    (addr, handle, tokio::spawn(coordinator.run()))
}

fn spawn_worker(addr: SocketAddr) -> JoinHandle<Result<Outcome, WorkerError>> {
    let mut config = WorkerConfig::new(addr.to_string());
    config.retry_delay = Duration::from_millis(50);
    tokio::spawn(async move { Worker::new(config, DigestCracker).run().await })
}

async fn finish(run: JoinHandle<Result<Report, ServerError>>) -> Report {
    timeout(DEADLINE, run).await.unwrap().unwrap().unwrap()
}

async fn raw_client(addr: SocketAddr) -> RawClient {
    Framed::new(TcpStream::connect(addr).await.unwrap(), MessageCodec::default())
}

async fn send(client: &mut RawClient, message: Message) {
    SinkExt::<Frame>::send(client, Frame::new(message))
        .await
        .unwrap();
}

/// Next message, or `None` once the coordinator closed the connection.
async fn recv(client: &mut RawClient) -> Option<Message> {
    timeout(DEADLINE, client.next())
        .await
        .unwrap()
        .map(|frame| frame.unwrap().unwrap().message)
}

async fn handshake(client: &mut RawClient) {
    send(client, Message::Hello).await;
    assert_eq!(recv(client).await, Some(Message::Ack));
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + DEADLINE;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn single_failing_worker_exhausts_a_tiny_keyspace() {
    let (addr, _handle, run) = start(digest_config("nope", "01", 2, 2)).await;
    let worker = spawn_worker(addr);

    let report = finish(run).await;
    assert_eq!(report.reason, Some(TerminationReason::Exhausted));
    assert_eq!(report.total_jobs, Position::from(2u32));
    assert_eq!(report.generated_jobs, Position::from(2u32));
    assert_eq!(report.finished_jobs, Position::from(2u32));
    assert_eq!(report.candidates_tried, Position::from(4u32));
    assert_eq!(report.max_clients, 1);
    assert!(!report.success);
    assert!(report.credentials.is_none());
    assert!(report.ended_at.is_some());

    let outcome = timeout(DEADLINE, worker).await.unwrap().unwrap().unwrap();
    assert_eq!(outcome, Outcome::Dismissed);
}

#[tokio::test]
async fn workers_find_a_digest_and_end_the_run() {
    let digest = sha256_hex("777");
    let (addr, _handle, run) = start(digest_config("777", "0123456789", 3, 50)).await;
    let workers = [spawn_worker(addr), spawn_worker(addr)];

    let report = finish(run).await;
    assert_eq!(report.reason, Some(TerminationReason::Success));
    assert!(report.success);
    let credentials = report.credentials.unwrap();
    assert_eq!(credentials.username, digest);
    assert_eq!(credentials.password, "777");
    assert!(report.winner.is_some());

    let mut found = 0;
    for worker in workers {
        let outcome = timeout(DEADLINE, worker).await.unwrap().unwrap().unwrap();
        if let Outcome::Found(password) = outcome {
            assert_eq!(password, "777");
            found += 1;
        }
    }
    assert_eq!(found, 1);
}

#[tokio::test]
async fn salted_digest_reports_the_matching_string() {
    let mut config = digest_config("", "ab", 3, 4);
    let salted = format!("{}:salt", sha256_hex("salt$bab"));
    config.target = TargetSource::parse_digest(JobKind::Sha256, &salted).unwrap();
    let (addr, _handle, run) = start(config).await;
    let _worker = spawn_worker(addr);

    let report = finish(run).await;
    assert_eq!(report.credentials.unwrap().password, "salt$bab");
}

#[tokio::test]
async fn workers_crack_a_salted_md5_digest() {
    let salted = format!("{}:pepper", hex::<Md5>("cab$pepper"));
    let target = TargetSource::parse_digest(JobKind::Md5, &salted).unwrap();
    let (addr, _handle, run) = start(config(target, "abc", 3, 5)).await;
    let _workers = [spawn_worker(addr), spawn_worker(addr)];

    let report = finish(run).await;
    assert_eq!(report.reason, Some(TerminationReason::Success));
    assert_eq!(report.kind, JobKind::Md5);
    let credentials = report.credentials.unwrap();
    assert_eq!(credentials.username, salted);
    assert_eq!(credentials.password, "cab$pepper");
}

#[tokio::test]
async fn job_limit_stops_the_run() {
    let mut config = digest_config("nope", "0123456789", 4, 10);
    config.max_jobs = Some(3);
    let (addr, _handle, run) = start(config).await;
    let _worker = spawn_worker(addr);

    let report = finish(run).await;
    assert_eq!(report.reason, Some(TerminationReason::MaxJobs));
    assert_eq!(report.total_jobs, Position::from(1000u32));
    assert_eq!(report.generated_jobs, Position::from(3u32));
    assert_eq!(report.finished_jobs, Position::from(3u32));
}

#[tokio::test]
async fn idle_before_hello_is_kicked() {
    let (addr, handle, run) = start(digest_config("nope", "01", 2, 2)).await;

    let mut client = raw_client(addr).await;
    send(&mut client, Message::Idle).await;
    assert_eq!(recv(&mut client).await, Some(Message::Leave));
    assert_eq!(recv(&mut client).await, None);

    eventually("session removal", || handle.sessions().is_empty()).await;
    assert!(handle.pending_jobs().is_empty());

    handle.terminate(TerminationReason::Requested);
    let report = finish(run).await;
    assert_eq!(report.reason, Some(TerminationReason::Requested));
    assert_eq!(report.finished_jobs, Position::from(0u32));
}

#[tokio::test]
async fn slow_worker_is_kicked_and_its_job_rescheduled() {
    let mut config = digest_config("nope", "01", 2, 2);
    config.job_timeout = Duration::from_millis(100);
    let (addr, handle, run) = start(config).await;

    let mut slow = raw_client(addr).await;
    handshake(&mut slow).await;
    send(&mut slow, Message::Idle).await;
    let Some(Message::Task(held)) = recv(&mut slow).await else {
        panic!("expected a task");
    };
    assert_eq!(held.params().offset, Position::from(0u32));
    assert_eq!(recv(&mut slow).await, Some(Message::Leave));
    assert_eq!(recv(&mut slow).await, None);
    eventually("session removal", || handle.sessions().is_empty()).await;

    let worker = spawn_worker(addr);
    let report = finish(run).await;
    assert_eq!(report.reason, Some(TerminationReason::Exhausted));
    assert_eq!(report.finished_jobs, Position::from(2u32));
    assert_eq!(report.candidates_tried, Position::from(4u32));
    assert_eq!(report.max_clients, 1);
    assert_eq!(
        timeout(DEADLINE, worker).await.unwrap().unwrap().unwrap(),
        Outcome::Dismissed
    );
}

#[tokio::test]
async fn disconnect_mid_job_frees_the_job() {
    let (addr, handle, run) = start(digest_config("nope", "01", 2, 2)).await;

    let mut quitter = raw_client(addr).await;
    handshake(&mut quitter).await;
    send(&mut quitter, Message::Idle).await;
    assert!(matches!(recv(&mut quitter).await, Some(Message::Task(_))));
    eventually("assignment", || handle.pending_jobs().len() == 1).await;
    drop(quitter);
    eventually("requeue", || handle.pending_jobs().is_empty()).await;

    let _worker = spawn_worker(addr);
    let report = finish(run).await;
    assert_eq!(report.reason, Some(TerminationReason::Exhausted));
    assert_eq!(report.finished_jobs, Position::from(2u32));
}

#[tokio::test]
async fn protocol_violations_do_not_end_the_session() {
    let (addr, handle, run) = start(digest_config("nope", "01", 2, 2)).await;

    let mut client = raw_client(addr).await;
    handshake(&mut client).await;
    // Results and errors without a pending job are ignored.
    send(
        &mut client,
        Message::Finished(JobResult::exhausted(keyspan_core::JobId::new())),
    )
    .await;
    send(
        &mut client,
        Message::ClientError(ClientError {
            job_id: None,
            reason: "confused".to_string(),
        }),
    )
    .await;
    // Garbage that is still a well-formed length-prefixed frame.
    SinkExt::<bytes::Bytes>::send(&mut client, bytes::Bytes::from_static(b"\xff\xff\xff"))
        .await
        .unwrap();

    send(&mut client, Message::Idle).await;
    let Some(Message::Task(job)) = recv(&mut client).await else {
        panic!("expected a task");
    };
    assert!(job.target().is_some());
    send(&mut client, Message::Finished(JobResult::exhausted(job.id()))).await;

    // The second task to a worker that finished a job omits the payload.
    let Some(Message::Task(second)) = recv(&mut client).await else {
        panic!("expected a task");
    };
    assert!(second.target().is_none());
    eventually("bookkeeping", || {
        handle.sessions().first().is_some_and(|s| s.finished == 1 && s.history.len() == 1)
    })
    .await;
    send(&mut client, Message::Finished(JobResult::exhausted(second.id()))).await;

    let report = finish(run).await;
    assert_eq!(report.reason, Some(TerminationReason::Exhausted));
    assert_eq!(recv(&mut client).await, Some(Message::Leave));
}

#[tokio::test]
async fn operator_can_kick_by_short_id() {
    let (addr, handle, run) = start(digest_config("nope", "01", 2, 2)).await;

    let mut client = raw_client(addr).await;
    handshake(&mut client).await;
    eventually("registration", || handle.sessions().len() == 1).await;

    let id = handle.sessions()[0].id.clone();
    assert!(handle.kick(&id));
    assert!(!handle.kick("ffffffff"));
    assert_eq!(recv(&mut client).await, Some(Message::Leave));

    handle.terminate(TerminationReason::Requested);
    handle.terminate(TerminationReason::Signal);
    let report = finish(run).await;
    assert_eq!(report.reason, Some(TerminationReason::Requested));
}

#[tokio::test]
async fn capture_target_is_awaited_and_shipped_with_identifiers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("HomeNet_A0B1C2D3E4F5.pcap");
    let mut config = config(TargetSource::Capture(path.clone()), "01", 2, 4);
    config.wait_for_target = true;
    let (addr, handle, run) = start(config).await;

    let mut client = raw_client(addr).await;
    handshake(&mut client).await;
    send(&mut client, Message::Idle).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::write(&path, b"handshake bytes").unwrap();

    let Some(Message::Task(job)) = recv(&mut client).await else {
        panic!("expected a task");
    };
    match job.target() {
        Some(Target::Wpa2 {
            capture,
            essid,
            bssid,
        }) => {
            assert_eq!(capture.as_ref(), b"handshake bytes");
            assert_eq!(essid, "HomeNet");
            assert_eq!(bssid, "A0:B1:C2:D3:E4:F5");
        }
        other => panic!("unexpected target {other:?}"),
    }

    // A worker that cannot handle the job gets dropped.
    send(
        &mut client,
        Message::ClientError(ClientError {
            job_id: Some(job.id()),
            reason: "no cracker for WPA2".to_string(),
        }),
    )
    .await;
    assert_eq!(recv(&mut client).await, Some(Message::Leave));
    eventually("requeue", || handle.pending_jobs().is_empty()).await;

    handle.terminate(TerminationReason::Requested);
    let report = finish(run).await;
    assert_eq!(report.target, "HomeNet A0:B1:C2:D3:E4:F5");
    assert_eq!(report.total_jobs, Position::from(1u32));
}
