use crate::server::config::ConfigError;

/// Errors that stop a coordinator from starting or running.
///
/// Per-client failures never surface here; they cost the run one client,
/// not the run itself.
#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] keyspan_core::Error),
}
