//! CLI error handling

use std::fmt;

use seclabel_errors::UserFacingError;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Configuration error
    Config(seclabel_errors::ConfigError),
    /// Label operation error
    Label(seclabel_errors::Error),
    /// Invalid command arguments
    InvalidArguments(String),
    /// I/O error
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {e}"),
            CliError::Label(e) => {
                write!(f, "{}", e.user_message())?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                if e.is_retryable() {
                    write!(f, "\n  Retry: safe to retry this operation.")?;
                }
                Ok(())
            }
            CliError::InvalidArguments(msg) => write!(f, "Invalid arguments: {msg}"),
            CliError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Label(e) => Some(e),
            CliError::Io(e) => Some(e),
            CliError::InvalidArguments(_) => None,
        }
    }
}

impl From<seclabel_errors::ConfigError> for CliError {
    fn from(e: seclabel_errors::ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<seclabel_errors::Error> for CliError {
    fn from(e: seclabel_errors::Error) -> Self {
        match e {
            seclabel_errors::Error::Config(e) => CliError::Config(e),
            other => CliError::Label(other),
        }
    }
}

impl From<seclabel_errors::LabelError> for CliError {
    fn from(e: seclabel_errors::LabelError) -> Self {
        CliError::Label(e.into())
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}
