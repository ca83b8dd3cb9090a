use thiserror::Error;

/// Environment faults that prevent the harness from producing a result.
///
/// Expected failure modes of the child process (non-zero exit, timeout,
/// missing executable) are not errors; they are encoded in
/// [`crate::Outcome`].
#[derive(Error, Debug)]
pub enum TetherError {
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, TetherError>;
