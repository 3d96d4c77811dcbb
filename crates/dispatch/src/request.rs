//! One in-flight asynchronous label operation
//!
//! A [`Request`] is created on the calling context, moved to a worker which
//! fills in the outcome, then moved back to the single-threaded context
//! where its completion runs and it is dropped. Ownership moves at each
//! step, so no two threads ever touch it at once.

use std::fmt;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use seclabel_errors::{LabelError, UserFacingError};
use seclabel_events::{EventEmitter, EventSender, FailureContext, LabelEvent};
use seclabel_platform::{LabelOperations, SecurityContext};
use uuid::Uuid;

use crate::guard::LifetimeGuard;
use crate::scheduler::Scheduler;

/// Identifies a request in events and logs
pub type RequestId = Uuid;

/// Result delivered to a completion: a context, no context, or an error
pub type Outcome = Result<Option<SecurityContext>, LabelError>;

/// Single-shot handler run on the single-threaded context
pub type Completion = Box<dyn FnOnce(Outcome) + Send + 'static>;

/// Asynchronous operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Operation {
    /// Policy default for a path (`matchpathcon`)
    ResolvePathContext,
    /// Label of a connected socket's peer (`getpeercon`)
    ResolvePeerContext,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ResolvePathContext => "matchpathcon",
            Self::ResolvePeerContext => "getpeercon",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs owned by the request, independent of the caller's copies
#[derive(Debug)]
pub enum RequestInput {
    Socket(OwnedFd),
    Path(String),
}

impl fmt::Display for RequestInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket(fd) => write!(f, "fd:{}", fd.as_raw_fd()),
            Self::Path(path) => f.write_str(path),
        }
    }
}

pub struct Request {
    id: RequestId,
    operation: Operation,
    input: RequestInput,
    outcome: Option<Outcome>,
    completion: Option<Completion>,
    owner: LifetimeGuard,
    scheduler: Arc<dyn Scheduler>,
    started: Instant,
    tx: Option<EventSender>,
}

impl Request {
    pub(crate) fn new(
        operation: Operation,
        input: RequestInput,
        completion: Completion,
        owner: LifetimeGuard,
        scheduler: Arc<dyn Scheduler>,
        tx: Option<EventSender>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            input,
            outcome: None,
            completion: Some(completion),
            owner,
            scheduler,
            started: Instant::now(),
            tx,
        }
    }

    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    #[must_use]
    pub fn input(&self) -> &RequestInput {
        &self.input
    }

    /// Worker side: run the blocking call, then hand the request to the
    /// scheduler.
    pub(crate) fn execute(mut self, ops: &dyn LabelOperations) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.perform(ops)))
            .unwrap_or_else(|payload| {
                Err(LabelError::WorkerPanicked {
                    operation: self.operation.as_str().to_string(),
                    message: panic_message(payload.as_ref()),
                })
            });
        tracing::trace!(request_id = %self.id, ok = outcome.is_ok(), "worker finished");
        self.outcome = Some(outcome);

        let scheduler = Arc::clone(&self.scheduler);
        scheduler.schedule(Box::new(move || self.complete()));
    }

    fn perform(&self, ops: &dyn LabelOperations) -> Outcome {
        match (self.operation, &self.input) {
            (Operation::ResolvePathContext, RequestInput::Path(path)) => {
                ops.match_path_context(path, None)
            }
            (Operation::ResolvePeerContext, RequestInput::Socket(fd)) => {
                ops.peer_context(fd.as_fd())
            }
            (operation, input) => Err(LabelError::invalid_argument(format!(
                "{operation} cannot take input {input}"
            ))),
        }
    }

    /// Context side: report, run the completion, drop the request.
    ///
    /// A panic in the completion unwinds out of here; dropping `self` on the
    /// way out still releases the owner.
    fn complete(mut self) {
        let outcome = self.outcome.take().unwrap_or_else(|| {
            Err(LabelError::WorkerUnavailable {
                message: "request completed before the worker ran".to_string(),
            })
        });
        self.report(&outcome);

        if let Some(completion) = self.completion.take() {
            completion(outcome);
        }
    }

    fn report(&self, outcome: &Outcome) {
        let duration_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let operation = self.operation.as_str().to_string();
        match outcome {
            Ok(context) => {
                tracing::debug!(request_id = %self.id, %operation, duration_ms, "request completed");
                self.tx.emit_label(LabelEvent::RequestCompleted {
                    request_id: self.id,
                    operation,
                    labeled: context.is_some(),
                    duration_ms,
                });
            }
            Err(err) => {
                tracing::debug!(request_id = %self.id, %operation, code = ?err.user_code(), "request failed: {err}");
                self.tx.emit_label(LabelEvent::RequestFailed {
                    request_id: self.id,
                    operation,
                    failure: FailureContext::from_label_error(err),
                    duration_ms,
                });
            }
        }
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        // Only reached with a pending completion if the job or its scheduled
        // task was dropped unrun.
        let Some(completion) = self.completion.take() else {
            return;
        };
        let outcome = self.outcome.take().unwrap_or_else(|| {
            Err(LabelError::WorkerUnavailable {
                message: format!("{} was dropped before it ran", self.operation),
            })
        });
        tracing::warn!(request_id = %self.id, operation = %self.operation, "request dropped unrun");
        self.report(&outcome);

        let owner = self.owner.clone();
        self.scheduler.schedule(Box::new(move || {
            let _owner = owner;
            completion(outcome);
        }));
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .field("input", &self.input)
            .field("outcome", &self.outcome)
            .field("pending", &self.completion.is_some())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
