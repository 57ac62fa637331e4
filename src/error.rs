//! Error taxonomy for sink operations.
//!
//! Every sink operation returns `Result<T, LogError>`. `LogError` is the
//! structured counterpart of the `ctx.errstr` short message a caller wants to
//! surface to the client: [`LogError::user_message`] renders exactly that
//! string, while the enum itself stays matchable for callers (and tests) that
//! care which kind of failure occurred.

use thiserror::Error;

/// A single failure out of a sink operation.
#[derive(Debug, Error)]
pub enum LogError {
    /// Memory exhaustion or an allocation-shaped failure from a lower layer.
    #[error("memory allocation failed")]
    Allocation,

    /// A formatted path would not fit in the platform's path length bound.
    #[error("path too long: {0}")]
    PathTooLong(String),

    /// An `open`/`read`/`write`/`rename`/`lock` call failed.
    #[error("{op} failed: {source}")]
    FilesystemIo {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Malformed wire bytes, an unrecognized info-value kind, or a truncated
    /// journal/timing record.
    #[error("invalid journal file, unable to restart")]
    Parse,

    /// A decoded message length exceeded the configured maximum.
    #[error("client message too large")]
    BoundExceeded,

    /// The requested operation is inconsistent with on-disk state (resume
    /// target not found, log already finalized, etc).
    #[error("{0}")]
    StateViolation(String),

    /// The random-drop test hook fired. Carries no message by design — the
    /// spec requires callers to fail silently here.
    #[error("")]
    RandomDrop,

    /// End of file reached while a journal replay still expected frames.
    #[error("unexpected EOF reading journal file")]
    UnexpectedEof,
}

impl LogError {
    /// The short, translatable string a host stores in `ctx.errstr` and may
    /// show to the client. [`LogError::RandomDrop`] deliberately renders
    /// empty: the random-drop policy is "fail with no errstr set".
    pub fn user_message(&self) -> String {
        match self {
            LogError::RandomDrop => String::new(),
            other => other.to_string(),
        }
    }

    pub fn io(op: &'static str, source: std::io::Error) -> Self {
        LogError::FilesystemIo { op, source }
    }
}

pub type Result<T> = std::result::Result<T, LogError>;
