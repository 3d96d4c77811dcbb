#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Asynchronous bridge for blocking label operations
//!
//! Lookups that may block (peer sockets, the policy database) run on a
//! [`WorkerPool`]; their results come back to a single-threaded context
//! through a [`Scheduler`]. Between the two, a [`Request`] owns everything
//! the operation needs, including a [`LifetimeGuard`] on the object that
//! started it.
//!
//! Guarantees:
//! - `dispatch` returns without blocking and never runs the completion
//! - each dispatch runs its completion exactly once, on the scheduler
//! - the owner outlives its outstanding requests
//!
//! A completion that panics is not caught; the panic leaves whatever is
//! driving the scheduler, with the owner already released.

pub mod dispatcher;
pub mod guard;
pub mod pool;
pub mod request;
pub mod scheduler;

pub use dispatcher::{DispatchInput, Dispatcher};
pub use guard::{LifetimeGuard, Liveness, Owner};
pub use pool::{InlinePool, Job, TokioPool, WorkerPool};
pub use request::{Completion, Operation, Outcome, Request, RequestId, RequestInput};
pub use scheduler::{LoopHandle, ManualScheduler, RunLoop, Scheduler, Task};
