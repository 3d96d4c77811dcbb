//! Submits blocking label operations and routes their results back
//!
//! `dispatch` never blocks and never calls the completion itself. Every
//! call, valid or not, ends in exactly one completion run by the
//! [`Scheduler`].

use std::os::fd::RawFd;
use std::sync::Arc;

use seclabel_config::fixed_paths;
use seclabel_errors::LabelError;
use seclabel_events::{EventEmitter, EventSender, FailureContext, LabelEvent};
use seclabel_platform::{fd, LabelOperations};
use uuid::Uuid;

use crate::guard::{LifetimeGuard, Owner};
use crate::pool::WorkerPool;
use crate::request::{Completion, Operation, Request, RequestId, RequestInput};
use crate::scheduler::Scheduler;

/// Caller-side input, before it is validated and copied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchInput {
    /// Descriptor borrowed from the caller; the request works on a duplicate
    Socket(RawFd),
    Path(String),
}

#[derive(Clone)]
pub struct Dispatcher {
    ops: Arc<dyn LabelOperations>,
    pool: Arc<dyn WorkerPool>,
    scheduler: Arc<dyn Scheduler>,
    max_path_len: usize,
    tx: Option<EventSender>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        ops: Arc<dyn LabelOperations>,
        pool: Arc<dyn WorkerPool>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            ops,
            pool,
            scheduler,
            max_path_len: fixed_paths::PATH_MAX,
            tx: None,
        }
    }

    /// Reject paths longer than `len` bytes
    #[must_use]
    pub fn with_max_path_len(mut self, len: usize) -> Self {
        self.max_path_len = len;
        self
    }

    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    #[must_use]
    pub fn max_path_len(&self) -> usize {
        self.max_path_len
    }

    /// Start `operation` on a worker and return at once.
    ///
    /// `owner` stays alive until `completion` has run. Invalid input is
    /// reported through `completion` like any other failure.
    pub fn dispatch(
        &self,
        owner: Arc<dyn Owner>,
        operation: Operation,
        input: DispatchInput,
        completion: Completion,
    ) -> RequestId {
        let validated = self.validate(operation, input);

        let guard = LifetimeGuard::acquire(owner);
        self.scheduler.reserve();

        let input = match validated {
            Ok(input) => input,
            Err(err) => return self.deliver_error(operation, err, guard, completion),
        };

        let request = Request::new(
            operation,
            input,
            completion,
            guard,
            Arc::clone(&self.scheduler),
            self.tx.clone(),
        );
        let id = request.id();

        tracing::debug!(request_id = %id, %operation, input = %request.input(), "dispatching");
        self.tx.emit_label(LabelEvent::RequestDispatched {
            request_id: id,
            operation: operation.as_str().to_string(),
            input: request.input().to_string(),
        });

        let ops = Arc::clone(&self.ops);
        self.pool
            .submit(Box::new(move || request.execute(ops.as_ref())));
        id
    }

    fn validate(&self, operation: Operation, input: DispatchInput) -> Result<RequestInput, LabelError> {
        match (operation, input) {
            (Operation::ResolvePathContext, DispatchInput::Path(path)) => {
                if path.is_empty() {
                    return Err(LabelError::invalid_argument("Must supply a file path."));
                }
                if path.len() > self.max_path_len {
                    return Err(LabelError::invalid_argument(format!(
                        "path is {} bytes, longer than the {} byte limit",
                        path.len(),
                        self.max_path_len
                    )));
                }
                if path.contains('\0') {
                    return Err(LabelError::invalid_argument("path must not contain NUL bytes"));
                }
                Ok(RequestInput::Path(path))
            }
            (Operation::ResolvePeerContext, DispatchInput::Socket(raw)) => {
                fd::duplicate_raw(raw).map(RequestInput::Socket)
            }
            (Operation::ResolvePathContext, DispatchInput::Socket(_)) => {
                Err(LabelError::invalid_argument("Must supply a file path."))
            }
            (Operation::ResolvePeerContext, DispatchInput::Path(_)) => {
                Err(LabelError::invalid_argument("Must supply a filedescriptor."))
            }
        }
    }

    /// Complete a request that failed before reaching a worker.
    ///
    /// For callers that validate their own arguments; the error still
    /// arrives through `completion` on the scheduler.
    pub fn reject(
        &self,
        owner: Arc<dyn Owner>,
        operation: Operation,
        err: LabelError,
        completion: Completion,
    ) -> RequestId {
        let guard = LifetimeGuard::acquire(owner);
        self.scheduler.reserve();
        self.deliver_error(operation, err, guard, completion)
    }

    /// Schedule an already-reserved failure, never inline.
    fn deliver_error(
        &self,
        operation: Operation,
        err: LabelError,
        guard: LifetimeGuard,
        completion: Completion,
    ) -> RequestId {
        let id = Uuid::new_v4();
        tracing::debug!(request_id = %id, %operation, "rejected: {err}");
        self.tx.emit_label(LabelEvent::RequestFailed {
            request_id: id,
            operation: operation.as_str().to_string(),
            failure: FailureContext::from_label_error(&err),
            duration_ms: 0,
        });

        self.scheduler.schedule(Box::new(move || {
            let _guard = guard;
            completion(Err(err));
        }));
        id
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("max_path_len", &self.max_path_len)
            .finish_non_exhaustive()
    }
}
