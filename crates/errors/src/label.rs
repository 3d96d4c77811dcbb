//! Labeling subsystem errors

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

/// Errors raised by label lookups, label mutations and the async bridge.
///
/// A lookup that succeeds but finds no label is not an error; it surfaces as
/// `Ok(None)` from the operation instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LabelError {
    /// Wrong arity or type, rejected before any native call.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The native call failed; `code` is the platform errno.
    #[error("{operation} failed: {message} (errno {code})")]
    Os {
        operation: String,
        code: i32,
        message: String,
    },

    /// A label buffer could not be allocated.
    #[error("out of memory during {operation}: could not allocate {requested} bytes")]
    AllocationFailure { operation: String, requested: usize },

    /// The worker pool dropped the job without running it.
    #[error("worker pool unavailable: {message}")]
    WorkerUnavailable { message: String },

    /// The blocking operation panicked on the worker thread.
    #[error("worker panicked during {operation}: {message}")]
    WorkerPanicked { operation: String, message: String },
}

impl LabelError {
    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an OS error from a raw errno value
    pub fn from_errno(operation: impl Into<String>, code: i32) -> Self {
        Self::Os {
            operation: operation.into(),
            code,
            message: std::io::Error::from_raw_os_error(code).to_string(),
        }
    }

    /// Capture `errno` of the calling thread right after a failed native call
    pub fn last_os_error(operation: impl Into<String>) -> Self {
        Self::from_io(operation, &std::io::Error::last_os_error())
    }

    /// Translate an I/O error, keeping its errno when it has one
    pub fn from_io(operation: impl Into<String>, err: &std::io::Error) -> Self {
        Self::Os {
            operation: operation.into(),
            code: err.raw_os_error().unwrap_or(libc_eio()),
            message: err.to_string(),
        }
    }

    /// Platform error number, if this error came from a native call
    #[must_use]
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Os { code, .. } => Some(*code),
            _ => None,
        }
    }
}

// EIO is 5 on every Linux architecture; avoids a libc dependency here.
const fn libc_eio() -> i32 {
    5
}

impl UserFacingError for LabelError {
    fn user_message(&self) -> Cow<'_, str> {
        match self {
            Self::InvalidArgument { message } => Cow::Borrowed(message.as_str()),
            _ => Cow::Owned(self.to_string()),
        }
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Os { code: 1 | 13, .. } => {
                Some("The loaded policy denied this operation; check the audit log for AVC denials.")
            }
            Self::Os { code: 22, .. } => {
                Some("The kernel rejected the context; verify it is valid for the loaded policy.")
            }
            Self::Os { code: 92, .. } => {
                Some("The socket carries no peer label; labeled networking may be disabled.")
            }
            Self::WorkerUnavailable { .. } => {
                Some("The async runtime is shutting down; retry from a live runtime.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::AllocationFailure { .. } | Self::WorkerUnavailable { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(match self {
            Self::InvalidArgument { .. } => "label.invalid_argument",
            Self::Os { .. } => "label.os_error",
            Self::AllocationFailure { .. } => "label.allocation_failure",
            Self::WorkerUnavailable { .. } => "label.worker_unavailable",
            Self::WorkerPanicked { .. } => "label.worker_panicked",
        })
    }
}
