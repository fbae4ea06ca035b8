#![doc = include_str!("../README.md")]

pub mod arith;
mod error;
mod id;
mod job;
mod keyspace;
pub mod proto;

pub use crate::arith::Position;
pub use crate::error::*;
pub use crate::id::*;
pub use crate::job::*;
pub use crate::keyspace::*;
pub use crate::proto::{ClientError, Frame, Message, MessageCodec};
