#![doc = include_str!("../README.md")]

pub mod worker;

pub use crate::worker::client::{Outcome, Worker, WorkerError, connect};
pub use crate::worker::config::{CliArgs, ConfigError, WorkerConfig};
pub use crate::worker::cracker::{CrackError, Cracker, DigestCracker};
