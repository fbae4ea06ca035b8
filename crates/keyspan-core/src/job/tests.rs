use crate::{Alphabet, Error, GenerationParams, Job, JobKind, JobResult, Position, Target};
use bytes::Bytes;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn params(alphabet: &str, length: u32, offset: u64, count: u64) -> GenerationParams {
    GenerationParams {
        alphabet: Alphabet::new(alphabet).unwrap(),
        length,
        offset: Position::from(offset),
        count,
    }
}

fn capture() -> Target {
    Target::Wpa2 {
        capture: Bytes::from_static(b"\xd4\xc3\xb2\xa1\x02\x00\x04\x00"),
        essid: "HomeNet".to_string(),
        bssid: "00:11:22:33:44:55".to_string(),
    }
}

fn digest() -> Target {
    Target::Sha256 {
        digest: "ab".repeat(32),
        salt: Some("pepper".to_string()),
    }
}

#[test]
fn new_job_assigns_unique_ids() {
    let a = Job::new(digest(), params("01", 2, 0, 2)).unwrap();
    let b = Job::new(digest(), params("01", 2, 0, 2)).unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(a.kind(), JobKind::Sha256);
    assert!(a.assigned_at().is_none());
}

#[test]
fn job_must_fit_inside_the_keyspace() {
    // 10^3 candidates: offsets 0..=999.
    assert!(Job::new(digest(), params("0123456789", 3, 990, 10)).is_ok());
    let err = Job::new(digest(), params("0123456789", 3, 991, 10)).unwrap_err();
    assert!(matches!(err, Error::OutOfRange { .. }));
    assert!(Job::new(digest(), params("0123456789", 3, 0, 0)).is_err());
    assert!(Job::new(digest(), params("0123456789", 0, 0, 1)).is_err());
}

#[test]
fn encode_decode_preserves_everything() {
    let md5 = Target::Md5 {
        digest: "cd".repeat(16),
        salt: None,
    };
    for target in [capture(), digest(), md5] {
        let mut job = Job::new(target, params("abcdef", 12, 1_000_000, 5000)).unwrap();
        job.mark_assigned(UNIX_EPOCH + Duration::from_millis(1_700_000_000_123));

        let decoded = Job::decode(&job.encode()).unwrap();
        assert_eq!(decoded, job);
        assert_eq!(decoded.target(), job.target());
        assert_eq!(decoded.params().offset, Position::from(1_000_000u32));
    }
}

#[test]
fn encode_decode_handles_offsets_beyond_u64() {
    let alphabet = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let offset = crate::arith::parse_decimal("47672401706823533450263320000").unwrap();
    let job = Job::new(
        digest(),
        GenerationParams {
            alphabet: Alphabet::new(alphabet).unwrap(),
            length: 16,
            offset: offset.clone(),
            count: 10_000,
        },
    )
    .unwrap();

    let decoded = Job::decode(&job.encode()).unwrap();
    assert_eq!(decoded.params().offset, offset);
}

#[test]
fn payload_can_be_omitted_and_restored() {
    let job = Job::new(capture(), params("01", 4, 0, 4)).unwrap();
    let bare = Job::decode(&job.without_target().encode()).unwrap();
    assert!(bare.target().is_none());
    assert_eq!(bare.kind(), JobKind::Wpa2);
    assert!(bare.encode().len() < job.encode().len());

    let restored = bare.clone().with_target(capture()).unwrap();
    assert_eq!(restored, job);
    assert!(bare.with_target(digest()).is_err());
}

#[test]
fn decode_rejects_garbage() {
    assert!(matches!(
        Job::decode(&[0xff, 0xff, 0xff]),
        Err(Error::Decode { .. })
    ));
    // A well-formed but empty task has no id or params.
    assert!(Job::decode(&[]).is_err());
}

#[test]
fn info_reports_first_and_last_candidates() {
    let mut job = Job::new(capture(), params("0123456789", 3, 120, 10)).unwrap();
    let at = SystemTime::now();
    job.mark_assigned(at);

    let info = job.info();
    assert_eq!(info.id, job.short_id());
    assert_eq!(info.kind, JobKind::Wpa2);
    assert_eq!(info.alphabet, "0123456789");
    assert_eq!(info.length, 3);
    assert_eq!(info.count, 10);
    assert_eq!(info.offset, Position::from(120u32));
    assert_eq!(info.first.as_deref(), Some("120"));
    assert_eq!(info.last.as_deref(), Some("129"));
    assert_eq!(info.assigned_at, Some(at));
}

#[test]
fn assigned_for_measures_time_since_dispatch() {
    let mut job = Job::new(digest(), params("01", 2, 0, 1)).unwrap();
    let now = SystemTime::now();
    assert!(job.assigned_for(now).is_none());

    job.mark_assigned(now - Duration::from_secs(30));
    let elapsed = job.assigned_for(now).unwrap();
    assert_eq!(elapsed, Duration::from_secs(30));
}

#[test]
fn results_round_trip() {
    let job = Job::new(digest(), params("01", 2, 0, 2)).unwrap();
    for result in [
        JobResult::found(job.id(), "pepper01"),
        JobResult::exhausted(job.id()),
    ] {
        assert_eq!(JobResult::decode(&result.encode()).unwrap(), result);
    }
}

#[test]
fn target_labels_name_the_credential() {
    assert_eq!(capture().label(), "HomeNet 00:11:22:33:44:55");
    assert_eq!(
        Target::Sha256 {
            digest: "ff".to_string(),
            salt: None
        }
        .label(),
        "ff"
    );
    assert!(!format!("{:?}", capture()).contains("xd4"));
    assert_eq!("SHA256".parse::<JobKind>().unwrap(), JobKind::Sha256);
    assert_eq!("md5".parse::<JobKind>().unwrap(), JobKind::Md5);
    assert!("sha1".parse::<JobKind>().is_err());
}

#[test]
fn hash_targets_share_one_shape() {
    let md5 = Target::hash(JobKind::Md5, "aa".repeat(16), Some("salt".to_string())).unwrap();
    assert_eq!(md5.kind(), JobKind::Md5);
    assert_eq!(md5.digest(), Some(("aa".repeat(16).as_str(), Some("salt"))));
    assert_eq!(md5.label(), format!("{}:salt", "aa".repeat(16)));
    assert!(Target::hash(JobKind::Wpa2, String::new(), None).is_none());
    assert!(capture().digest().is_none());
    assert_eq!(JobKind::Md5.digest_len(), Some(16));
    assert_eq!(JobKind::Sha256.digest_len(), Some(32));
    assert_eq!(JobKind::Wpa2.digest_len(), None);
}
