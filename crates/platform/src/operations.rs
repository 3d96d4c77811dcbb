//! Blocking label operations
//!
//! Every method performs one logical call into the labeling subsystem and
//! blocks the calling thread until it returns. Callers that must not block
//! go through the dispatch bridge instead.

use std::ffi::CStr;
use std::os::fd::BorrowedFd;

use seclabel_errors::LabelError;
use seclabel_events::ContextAttribute;

use crate::context::SecurityContext;

/// Form in which the process context is returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextForm {
    /// Human-readable form (`getcon`)
    Translated,
    /// Kernel form (`getcon_raw`)
    Raw,
}

/// Whether a file lookup follows a trailing symlink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Follow {
    /// `getfilecon`
    Symlinks,
    /// `lgetfilecon`
    NoSymlinks,
}

/// File type filter of a file_contexts entry (`--`, `-d`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Socket,
    Fifo,
}

impl FileKind {
    /// Parse the type field of a file_contexts line
    #[must_use]
    pub fn from_spec(field: &str) -> Option<Self> {
        Some(match field {
            "--" => Self::Regular,
            "-d" => Self::Directory,
            "-l" => Self::Symlink,
            "-c" => Self::CharDevice,
            "-b" => Self::BlockDevice,
            "-s" => Self::Socket,
            "-p" => Self::Fifo,
            _ => return None,
        })
    }
}

/// The labeling subsystem as seen by the rest of the workspace.
///
/// `Ok(None)` means the lookup succeeded and found no label. Failures carry
/// the platform errno. Implementations never retry a failed call.
pub trait LabelOperations: Send + Sync {
    /// Context of the calling thread
    fn current_context(&self, form: ContextForm) -> Result<Option<SecurityContext>, LabelError>;

    /// Context stored on a filesystem object
    fn file_context(
        &self,
        path: &CStr,
        follow: Follow,
    ) -> Result<Option<SecurityContext>, LabelError>;

    /// Context of the remote end of a connected socket
    fn peer_context(&self, socket: BorrowedFd<'_>) -> Result<Option<SecurityContext>, LabelError>;

    /// Context the policy database assigns to a path
    fn match_path_context(
        &self,
        path: &str,
        kind: Option<FileKind>,
    ) -> Result<Option<SecurityContext>, LabelError>;

    /// Set a creation attribute of the calling thread; `None` resets it to
    /// the policy default.
    fn set_attribute(
        &self,
        attribute: ContextAttribute,
        context: Option<&CStr>,
    ) -> Result<(), LabelError>;

    /// Context for the next `execve` of this thread (`setexeccon`)
    fn set_exec_context(&self, context: Option<&CStr>) -> Result<(), LabelError> {
        self.set_attribute(ContextAttribute::Exec, context)
    }

    /// Context for files this thread creates (`setfscreatecon`)
    fn set_fs_create_context(&self, context: Option<&CStr>) -> Result<(), LabelError> {
        self.set_attribute(ContextAttribute::FsCreate, context)
    }

    /// Context for sockets this thread creates (`setsockcreatecon`)
    fn set_sock_create_context(&self, context: Option<&CStr>) -> Result<(), LabelError> {
        self.set_attribute(ContextAttribute::SockCreate, context)
    }

    /// Whether the subsystem is active on this host
    fn is_enabled(&self) -> bool;
}
