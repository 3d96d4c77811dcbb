//! Label operation and async dispatch events

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::FailureContext;

/// Which per-thread creation attribute a set operation touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextAttribute {
    Exec,
    FsCreate,
    SockCreate,
}

impl ContextAttribute {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exec => "exec",
            Self::FsCreate => "fscreate",
            Self::SockCreate => "sockcreate",
        }
    }
}

/// Events emitted around label lookups and the async dispatch bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LabelEvent {
    /// A request was accepted and handed to the worker pool
    RequestDispatched {
        request_id: Uuid,
        operation: String,
        /// Display form of the input (path or `fd:<n>`)
        input: String,
    },

    /// The completion for a request ran with a result
    RequestCompleted {
        request_id: Uuid,
        operation: String,
        /// `false` when the subsystem reported no label
        labeled: bool,
        duration_ms: u64,
    },

    /// The completion for a request ran with an error
    RequestFailed {
        request_id: Uuid,
        operation: String,
        failure: FailureContext,
        duration_ms: u64,
    },

    /// A creation attribute of the calling thread was set or reset
    AttributeChanged {
        attribute: ContextAttribute,
        context: Option<String>,
    },

    /// The file_contexts policy database was loaded
    PolicyLoaded {
        policy_type: String,
        path: PathBuf,
        specs: usize,
        substitutions: usize,
    },
}

impl LabelEvent {
    /// Request id carried by the event, if it belongs to an async request
    #[must_use]
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            Self::RequestDispatched { request_id, .. }
            | Self::RequestCompleted { request_id, .. }
            | Self::RequestFailed { request_id, .. } => Some(*request_id),
            Self::AttributeChanged { .. } | Self::PolicyLoaded { .. } => None,
        }
    }
}
