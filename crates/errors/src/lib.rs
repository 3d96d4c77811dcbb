#![warn(mismatched_lifetime_syntaxes)]
#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for seclabel
//!
//! This crate provides the error taxonomy shared by the label operations,
//! the async dispatch bridge and the CLI. All error types implement Clone so
//! they can cross the worker/run-loop boundary.

use std::borrow::Cow;

use thiserror::Error;

pub mod config;
pub mod label;

// Re-export all error types at the root
pub use config::ConfigError;
pub use label::LabelError;

/// Generic error type for cross-crate boundaries
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("label error: {0}")]
    Label(#[from] LabelError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Minimal interface for rendering user-facing error information without
/// requiring heavyweight envelopes.
pub trait UserFacingError {
    /// Short message suitable for CLI output.
    fn user_message(&self) -> Cow<'_, str>;

    /// Optional remediation hint.
    fn user_hint(&self) -> Option<&'static str> {
        None
    }

    /// Whether retrying the same operation is likely to succeed.
    fn is_retryable(&self) -> bool {
        false
    }

    /// Stable error code for analytics / structured reporting.
    fn user_code(&self) -> Option<&'static str> {
        None
    }
}

impl UserFacingError for Error {
    fn user_message(&self) -> Cow<'_, str> {
        match self {
            Error::Label(err) => err.user_message(),
            Error::Config(err) => err.user_message(),
        }
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Error::Label(err) => err.user_hint(),
            Error::Config(err) => err.user_hint(),
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Error::Label(err) => err.is_retryable(),
            Error::Config(err) => err.is_retryable(),
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        match self {
            Error::Label(err) => err.user_code(),
            Error::Config(_) => Some("error.config"),
        }
    }
}
