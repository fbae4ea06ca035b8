use super::*;
use crate::{Alphabet, GenerationParams, Position, Target};
use bytes::{BufMut, BytesMut};
use futures::{SinkExt, StreamExt};
use prost::Message as _;
use tokio_util::codec::{FramedRead, FramedWrite};

fn job() -> Job {
    Job::new(
        Target::Sha256 {
            digest: "0".repeat(64),
            salt: None,
        },
        GenerationParams {
            alphabet: Alphabet::new("abc").unwrap(),
            length: 3,
            offset: Position::from(4u32),
            count: 9,
        },
    )
    .unwrap()
}

fn all_messages() -> Vec<Message> {
    let job = job();
    vec![
        Message::Hello,
        Message::Ack,
        Message::Idle,
        Message::Finished(JobResult::found(job.id(), "bcb")),
        Message::ClientError(ClientError {
            job_id: Some(job.id()),
            reason: "cracker exited with status 1".to_string(),
        }),
        Message::ClientError(ClientError {
            job_id: None,
            reason: "no target cached".to_string(),
        }),
        Message::Task(job),
        Message::Leave,
    ]
}

#[test]
fn frames_keep_kind_id_and_payload() {
    for message in all_messages() {
        let frame = Frame::new(message);
        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded, frame, "{}", frame.message.name());
    }
}

#[test]
fn unknown_kind_is_a_decode_error() {
    let body = wire::Envelope {
        kind: 42,
        id: MessageId::new().to_bytes().to_vec(),
        payload: Bytes::new(),
    }
    .encode_to_vec();
    assert!(matches!(Frame::decode(&body), Err(Error::Decode { .. })));
}

#[test]
fn payload_mismatching_its_kind_is_rejected() {
    let body = wire::Envelope {
        kind: MessageKind::Task.into(),
        id: MessageId::new().to_bytes().to_vec(),
        payload: Bytes::from_static(b"definitely not a task"),
    }
    .encode_to_vec();
    assert!(Frame::decode(&body).is_err());
}

#[test]
fn task_with_an_absurd_length_is_rejected_quickly() {
    let printable: String = (' '..='~').collect();
    for length in [20_000_000, u32::MAX] {
        let task = wire::Task {
            kind: wire::JobKind::Sha256.into(),
            id: JobId::new().to_bytes().to_vec(),
            target: None,
            params: Some(wire::GenerationParams {
                alphabet: printable.clone(),
                length,
                offset: Vec::new(),
                count: 1,
            }),
            assigned_at_ms: 0,
        };
        let body = wire::Envelope {
            kind: MessageKind::Task.into(),
            id: MessageId::new().to_bytes().to_vec(),
            payload: Bytes::from(task.encode_to_vec()),
        }
        .encode_to_vec();

        let started = std::time::Instant::now();
        assert!(matches!(Frame::decode(&body), Err(Error::Decode { .. })));
        assert!(started.elapsed() < core::time::Duration::from_secs(1));
    }
}

#[test]
fn encode_frame_enforces_the_limit() {
    let frame = Frame::new(Message::Task(job()));
    let size = frame.encode().len();
    assert!(encode_frame(&frame, size).is_ok());
    assert!(matches!(
        encode_frame(&frame, size - 1),
        Err(Error::FrameTooLarge { got_bytes, .. }) if got_bytes == size
    ));
}

#[tokio::test]
async fn codec_streams_frames_in_order() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let mut writer = FramedWrite::new(client, MessageCodec::default());
    let mut reader = FramedRead::new(server, MessageCodec::default());

    let sent: Vec<Frame> = all_messages().into_iter().map(Frame::new).collect();
    for frame in sent.clone() {
        writer.send(frame).await.unwrap();
    }
    drop(writer);

    let mut received = Vec::new();
    while let Some(item) = reader.next().await {
        received.push(item.unwrap().unwrap());
    }
    assert_eq!(received, sent);
}

#[tokio::test]
async fn malformed_frame_is_skipped_not_fatal() {
    let good = Frame::new(Message::Idle);
    let mut buf = BytesMut::new();

    let garbage = b"\xff\xff\xff";
    buf.put_u32(garbage.len() as u32);
    buf.put_slice(garbage);
    let body = good.encode();
    buf.put_u32(body.len() as u32);
    buf.put_slice(&body);

    let mut reader = FramedRead::new(&buf[..], MessageCodec::default());
    assert!(reader.next().await.unwrap().unwrap().is_err());
    assert_eq!(reader.next().await.unwrap().unwrap().unwrap(), good);
    assert!(reader.next().await.is_none());
}

#[tokio::test]
async fn oversized_length_prefix_ends_the_stream() {
    let mut buf = BytesMut::new();
    buf.put_u32(1024);
    buf.put_slice(&[0; 1024]);

    let mut reader = FramedRead::new(&buf[..], MessageCodec::new(512));
    assert!(reader.next().await.unwrap().is_err());
}
