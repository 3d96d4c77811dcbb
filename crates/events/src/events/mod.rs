use serde::{Deserialize, Serialize};

use crate::EventSource;
use seclabel_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureContext {
    /// Stable error code, when the error has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Platform errno for failed native calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self {
            code: error.user_code().map(Into::into),
            message: error.user_message().into_owned(),
            hint: error.user_hint().map(Into::into),
            errno: None,
            retryable: error.is_retryable(),
        }
    }

    /// Same as [`FailureContext::from_error`], keeping the errno of label errors.
    #[must_use]
    pub fn from_label_error(error: &seclabel_errors::LabelError) -> Self {
        Self {
            errno: error.errno(),
            ..Self::from_error(error)
        }
    }
}

pub mod label;

pub use label::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// Label lookups, mutations and async requests
    Label(LabelEvent),
}

impl AppEvent {
    /// Identify the source domain for this event (used for metadata/logging).
    #[must_use]
    pub fn event_source(&self) -> EventSource {
        match self {
            Self::Label(LabelEvent::PolicyLoaded { .. }) => EventSource::POLICY,
            Self::Label(
                LabelEvent::RequestDispatched { .. }
                | LabelEvent::RequestCompleted { .. }
                | LabelEvent::RequestFailed { .. },
            ) => EventSource::DISPATCH,
            Self::Label(LabelEvent::AttributeChanged { .. }) => EventSource::LABEL,
        }
    }

    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::Label(LabelEvent::RequestFailed { .. }) => Level::ERROR,

            Self::Label(
                LabelEvent::RequestDispatched { .. } | LabelEvent::RequestCompleted { .. },
            ) => Level::DEBUG,

            Self::Label(LabelEvent::AttributeChanged { .. } | LabelEvent::PolicyLoaded { .. }) => {
                Level::INFO
            }
        }
    }
}
