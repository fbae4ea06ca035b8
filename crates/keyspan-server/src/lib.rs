#![doc = include_str!("../README.md")]

pub mod server;

pub use crate::server::config::{CliArgs, ConfigError, ServerConfig, TargetSource};
pub use crate::server::error::ServerError;
pub use crate::server::inspector::{FilenameInspector, InspectError, TargetInfo, TargetInspector};
pub use crate::server::report::{Credentials, Report, TerminationReason, Winner};
pub use crate::server::service::{Coordinator, CoordinatorHandle};
pub use crate::server::session::SessionInfo;
