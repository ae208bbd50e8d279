//! Error types for the kernel seam and the execution engine.

use std::time::Duration;

use thiserror::Error;

/// Failure of one kernel invocation.
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("failed to start kernel command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("execution timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("kernel exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    #[error("kernel returned {actual} cells for {expected} units")]
    CellCountMismatch { expected: usize, actual: usize },

    #[error("malformed notebook: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KernelError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Internal failure of an `execute` call that is not the snippet's fault.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("session `{0}` was reset while executing")]
    SessionReset(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
