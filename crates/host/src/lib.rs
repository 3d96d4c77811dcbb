#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Host-facing label API
//!
//! [`SELinux`] is the object a host environment holds. Synchronous lookups
//! and attribute changes run on the caller's thread; peer and path lookups
//! go through the dispatch bridge and report back on the host's run loop.
//! The [`dynamic`] module exposes the same operations by name, taking
//! untyped host values.

pub mod dynamic;

pub use dynamic::{error_value, HostCallback, Method};

use std::os::fd::AsRawFd;
use std::sync::Arc;

use seclabel_config::Config;
use seclabel_dispatch::{
    DispatchInput, Dispatcher, Liveness, Operation, Outcome, Owner, RequestId, Scheduler,
    TokioPool, WorkerPool,
};
use seclabel_errors::LabelError;
use seclabel_events::EventSender;
use seclabel_platform::{
    codec, ContextForm, Follow, LabelOperations, LinuxLabelOperations, SecurityContext,
};

/// Handle on the labeling subsystem for one host environment
pub struct SELinux {
    liveness: Liveness,
    ops: Arc<dyn LabelOperations>,
    dispatcher: Dispatcher,
}

impl Owner for SELinux {
    fn liveness(&self) -> &Liveness {
        &self.liveness
    }
}

impl SELinux {
    /// Assemble from explicit parts
    #[must_use]
    pub fn new(
        ops: Arc<dyn LabelOperations>,
        pool: Arc<dyn WorkerPool>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&ops), pool, scheduler);
        Self {
            liveness: Liveness::new(),
            ops,
            dispatcher,
        }
    }

    /// The Linux backend on the current tokio runtime, configured by `config`
    ///
    /// # Errors
    ///
    /// Returns `WorkerUnavailable` when called outside a tokio runtime.
    pub fn from_config(
        config: &Config,
        scheduler: Arc<dyn Scheduler>,
        tx: Option<EventSender>,
    ) -> Result<Self, LabelError> {
        let mut ops = LinuxLabelOperations::new(config.policy.clone());
        if let Some(tx) = &tx {
            ops = ops.with_event_sender(tx.clone());
        }
        let ops: Arc<dyn LabelOperations> = Arc::new(ops);

        let mut dispatcher = Dispatcher::new(
            Arc::clone(&ops),
            Arc::new(TokioPool::current()?),
            scheduler,
        )
        .with_max_path_len(config.dispatch.max_path_len);
        if let Some(tx) = tx {
            dispatcher = dispatcher.with_event_sender(tx);
        }

        Ok(Self {
            liveness: Liveness::new(),
            ops,
            dispatcher,
        })
    }

    /// Report async requests on `tx`
    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.dispatcher = self.dispatcher.with_event_sender(tx);
        self
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Async requests still holding this handle alive
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.liveness.outstanding()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.ops.is_enabled()
    }

    /// Context of the calling thread (`getcon`)
    ///
    /// # Errors
    ///
    /// Returns an OS error if the process attribute cannot be read.
    pub fn get_context(&self) -> Result<Option<SecurityContext>, LabelError> {
        self.ops.current_context(ContextForm::Translated)
    }

    /// Kernel form of the calling thread's context (`getcon_raw`)
    ///
    /// # Errors
    ///
    /// Returns an OS error if the process attribute cannot be read.
    pub fn get_context_raw(&self) -> Result<Option<SecurityContext>, LabelError> {
        self.ops.current_context(ContextForm::Raw)
    }

    /// Label stored on a file, following symlinks (`getfilecon`)
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty path or one containing NUL,
    /// otherwise the OS error of the lookup.
    pub fn get_file_context(&self, path: &str) -> Result<Option<SecurityContext>, LabelError> {
        self.file_context(path, Follow::Symlinks)
    }

    /// Label stored on a symlink itself (`lgetfilecon`)
    ///
    /// # Errors
    ///
    /// Same as [`SELinux::get_file_context`].
    pub fn get_link_context(&self, path: &str) -> Result<Option<SecurityContext>, LabelError> {
        self.file_context(path, Follow::NoSymlinks)
    }

    fn file_context(&self, path: &str, follow: Follow) -> Result<Option<SecurityContext>, LabelError> {
        if path.is_empty() {
            return Err(LabelError::invalid_argument("Must supply a file path."));
        }
        let path = codec::encode(path)?;
        self.ops.file_context(&path, follow)
    }

    /// Peer label of a connected socket (`getpeercon`), reported on the
    /// scheduler. The socket is duplicated; the caller may close it at once.
    pub fn get_peer_context<S, F>(self: &Arc<Self>, socket: &S, completion: F) -> RequestId
    where
        S: AsRawFd,
        F: FnOnce(Outcome) + Send + 'static,
    {
        self.dispatcher.dispatch(
            self.owner(),
            Operation::ResolvePeerContext,
            DispatchInput::Socket(socket.as_raw_fd()),
            Box::new(completion),
        )
    }

    /// Policy default context for a path (`matchpathcon`), reported on the
    /// scheduler
    pub fn resolve_path_context<F>(self: &Arc<Self>, path: impl Into<String>, completion: F) -> RequestId
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        self.dispatcher.dispatch(
            self.owner(),
            Operation::ResolvePathContext,
            DispatchInput::Path(path.into()),
            Box::new(completion),
        )
    }

    fn owner(self: &Arc<Self>) -> Arc<dyn Owner> {
        Arc::clone(self) as Arc<dyn Owner>
    }

    /// Context for this thread's next `execve` (`setexeccon`)
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the context contains NUL, otherwise the
    /// kernel's verdict.
    pub fn set_exec_context(&self, context: &str) -> Result<(), LabelError> {
        self.ops.set_exec_context(Some(&codec::encode(context)?))
    }

    /// Context for files this thread creates (`setfscreatecon`)
    ///
    /// # Errors
    ///
    /// See [`SELinux::set_exec_context`].
    pub fn set_fs_create_context(&self, context: &str) -> Result<(), LabelError> {
        self.ops.set_fs_create_context(Some(&codec::encode(context)?))
    }

    /// Context for sockets this thread creates (`setsockcreatecon`)
    ///
    /// # Errors
    ///
    /// See [`SELinux::set_exec_context`].
    pub fn set_sock_create_context(&self, context: &str) -> Result<(), LabelError> {
        self.ops.set_sock_create_context(Some(&codec::encode(context)?))
    }

    /// Go back to the policy default on `execve`
    ///
    /// # Errors
    ///
    /// Returns the OS error of the write.
    pub fn reset_exec_context(&self) -> Result<(), LabelError> {
        self.ops.set_exec_context(None)
    }

    /// # Errors
    ///
    /// Returns the OS error of the write.
    pub fn reset_fs_create_context(&self) -> Result<(), LabelError> {
        self.ops.set_fs_create_context(None)
    }

    /// # Errors
    ///
    /// Returns the OS error of the write.
    pub fn reset_sock_create_context(&self) -> Result<(), LabelError> {
        self.ops.set_sock_create_context(None)
    }
}

impl std::fmt::Debug for SELinux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SELinux")
            .field("outstanding", &self.outstanding())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
