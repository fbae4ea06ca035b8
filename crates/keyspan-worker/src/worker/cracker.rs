//! What a worker does with a job.
//!
//! A [`Cracker`] tests every candidate of a job against its target and
//! returns the one that matched. It runs on a blocking thread, so
//! implementations may burn CPU or shell out freely.

use keyspan_core::{Job, JobKind};
use md5::Md5;
use sha2::{Digest, Sha256};

#[derive(thiserror::Error, Debug)]
pub enum CrackError {
    #[error("{0} jobs are not supported by this worker")]
    Unsupported(JobKind),

    #[error("job carries no target")]
    MissingTarget,

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error(transparent)]
    Keyspace(#[from] keyspan_core::Error),

    /// The cracking backend ran but failed, as opposed to finding nothing.
    #[error("cracking failed: {0}")]
    Failed(String),
}

/// Oracle that searches one job's candidate range.
pub trait Cracker: Send + Sync + 'static {
    /// Returns the matching string, or `None` if no candidate matched.
    ///
    /// # Errors
    ///
    /// Returns [`CrackError`] if the job could not be searched at all.
    fn crack(&self, job: &Job) -> Result<Option<String>, CrackError>;
}

/// In-process MD5 and SHA-256 cracker.
///
/// Unsalted targets are compared against `hash(candidate)`. With a salt,
/// `candidate`, `salt + candidate`, `candidate + salt`, `salt$candidate` and
/// `candidate$salt` are tried in that order, and the matching string is what
/// gets reported.
#[derive(Clone, Copy, Debug, Default)]
pub struct DigestCracker;

impl Cracker for DigestCracker {
    fn crack(&self, job: &Job) -> Result<Option<String>, CrackError> {
        let target = job.target().ok_or(CrackError::MissingTarget)?;
        let kind = target.kind();
        let (digest, salt) = target.digest().ok_or(CrackError::Unsupported(kind))?;
        let expected = decode_digest(digest, kind)?;

        match kind {
            JobKind::Md5 => search::<Md5>(job, &expected, salt),
            JobKind::Sha256 => search::<Sha256>(job, &expected, salt),
            JobKind::Wpa2 => Err(CrackError::Unsupported(kind)),
        }
    }
}

fn search<D: Digest>(
    job: &Job,
    expected: &[u8],
    salt: Option<&str>,
) -> Result<Option<String>, CrackError> {
    let params = job.params();
    let keyspace = params.keyspace()?;
    for candidate in keyspace.candidates(&params.offset, params.count)? {
        for attempt in salted(&candidate, salt) {
            if D::digest(attempt.as_bytes()).as_slice() == expected {
                return Ok(Some(attempt));
            }
        }
    }
    Ok(None)
}

fn salted(candidate: &str, salt: Option<&str>) -> Vec<String> {
    match salt {
        None => vec![candidate.to_string()],
        Some(salt) => vec![
            candidate.to_string(),
            format!("{salt}{candidate}"),
            format!("{candidate}{salt}"),
            format!("{salt}${candidate}"),
            format!("{candidate}${salt}"),
        ],
    }
}

fn decode_digest(hex: &str, kind: JobKind) -> Result<Vec<u8>, CrackError> {
    let invalid = || CrackError::InvalidTarget(format!("{hex:?} is not a {kind} digest"));
    let len = kind.digest_len().ok_or(CrackError::Unsupported(kind))?;
    if hex.len() != len * 2 {
        return Err(invalid());
    }
    hex.as_bytes()
        .chunks_exact(2)
        .map(|pair| {
            let pair = core::str::from_utf8(pair).map_err(|_| invalid())?;
            u8::from_str_radix(pair, 16).map_err(|_| invalid())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyspan_core::{Alphabet, GenerationParams, Position, Target};

    fn hex<D: Digest>(input: &str) -> String {
        D::digest(input.as_bytes())
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    fn sha256_hex(input: &str) -> String {
        hex::<Sha256>(input)
    }

    fn job(digest: String, salt: Option<&str>, offset: u32, count: u64) -> Job {
        hash_job(JobKind::Sha256, digest, salt, offset, count)
    }

    fn hash_job(
        kind: JobKind,
        digest: String,
        salt: Option<&str>,
        offset: u32,
        count: u64,
    ) -> Job {
        Job::new(
            Target::hash(kind, digest, salt.map(str::to_string)).unwrap(),
            GenerationParams {
                alphabet: Alphabet::decimal(),
                length: 4,
                offset: Position::from(offset),
                count,
            },
        )
        .unwrap()
    }

    #[test]
    fn finds_an_unsalted_candidate_in_range() {
        let cracker = DigestCracker;
        let hit = job(sha256_hex("1234"), None, 1200, 100);
        assert_eq!(cracker.crack(&hit).unwrap().as_deref(), Some("1234"));

        let miss = job(sha256_hex("1234"), None, 0, 1000);
        assert_eq!(cracker.crack(&miss).unwrap(), None);
    }

    #[test]
    fn reports_the_salted_string_that_matched() {
        let cracker = DigestCracker;
        let found = cracker
            .crack(&job(sha256_hex("0042$pepper"), Some("pepper"), 0, 100))
            .unwrap();
        assert_eq!(found.as_deref(), Some("0042$pepper"));

        let found = cracker
            .crack(&job(sha256_hex("pepper0007"), Some("pepper"), 0, 10))
            .unwrap();
        assert_eq!(found.as_deref(), Some("pepper0007"));
    }

    #[test]
    fn cracks_md5_targets() {
        assert_eq!(hex::<Md5>("hello"), "5d41402abc4b2a76b9719d911017c592");

        let cracker = DigestCracker;
        let hit = hash_job(JobKind::Md5, hex::<Md5>("0815"), None, 800, 100);
        assert_eq!(cracker.crack(&hit).unwrap().as_deref(), Some("0815"));

        let salted = hash_job(JobKind::Md5, hex::<Md5>("salt0815"), Some("salt"), 0, 1000);
        assert_eq!(cracker.crack(&salted).unwrap().as_deref(), Some("salt0815"));

        // A SHA-256 digest of the same candidate never matches an MD5 job.
        let truncated = sha256_hex("0815")[..32].to_string();
        let wrong = hash_job(JobKind::Md5, truncated, None, 0, 10_000);
        assert_eq!(cracker.crack(&wrong).unwrap(), None);
    }

    #[test]
    fn rejects_other_kinds_and_bad_digests() {
        let wpa2 = Job::new(
            Target::Wpa2 {
                capture: Default::default(),
                essid: "net".to_string(),
                bssid: "00:11:22:33:44:55".to_string(),
            },
            GenerationParams {
                alphabet: Alphabet::decimal(),
                length: 4,
                offset: Position::from(0u32),
                count: 1,
            },
        )
        .unwrap();
        assert!(matches!(
            DigestCracker.crack(&wpa2),
            Err(CrackError::Unsupported(JobKind::Wpa2))
        ));
        assert!(matches!(
            DigestCracker.crack(&wpa2.without_target()),
            Err(CrackError::MissingTarget)
        ));
        assert!(matches!(
            DigestCracker.crack(&job("zz".repeat(32), None, 0, 1)),
            Err(CrackError::InvalidTarget(_))
        ));
        assert!(matches!(
            DigestCracker.crack(&hash_job(JobKind::Md5, "ab".repeat(32), None, 0, 1)),
            Err(CrackError::InvalidTarget(_))
        ));
    }
}
