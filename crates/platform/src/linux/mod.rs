//! Linux labeling backend
//!
//! Talks to the kernel directly instead of linking libselinux: process
//! attributes through procfs, file labels through the `security.selinux`
//! xattr, peer labels through `SO_PEERSEC`, and path defaults through the
//! file_contexts database under the policy root.

pub mod policy;

use std::ffi::CStr;
use std::fs::OpenOptions;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use seclabel_config::{fixed_paths, PolicyConfig};
use seclabel_errors::LabelError;
use seclabel_events::{ContextAttribute, EventEmitter, EventSender, LabelEvent};

use crate::codec::{self, LabelBuffer};
use crate::context::SecurityContext;
use crate::operations::{ContextForm, FileKind, Follow, LabelOperations};

pub use policy::FileContexts;

const XATTR_NAME: &CStr = c"security.selinux";

/// `LabelOperations` backed by procfs, xattrs and `SO_PEERSEC`
pub struct LinuxLabelOperations {
    config: PolicyConfig,
    file_contexts: Mutex<Option<Arc<FileContexts>>>,
    tx: Option<EventSender>,
}

impl LinuxLabelOperations {
    #[must_use]
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            config,
            file_contexts: Mutex::new(None),
            tx: None,
        }
    }

    /// Report attribute changes and policy loads on `tx`
    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    /// Policy type in effect: configured, else `SELINUXTYPE=`, else `targeted`
    #[must_use]
    pub fn policy_type(&self) -> String {
        self.config
            .policy_type
            .clone()
            .or_else(|| policy::configured_policy_type(&self.config.selinux_root.join("config")))
            .unwrap_or_else(|| fixed_paths::DEFAULT_POLICY_TYPE.to_string())
    }

    /// The file_contexts database, loaded on first use
    ///
    /// # Errors
    ///
    /// Returns the load error; a failed load is retried on the next call.
    pub fn file_contexts(&self) -> Result<Arc<FileContexts>, LabelError> {
        let mut slot = self
            .file_contexts
            .lock()
            .map_err(|_| LabelError::from_errno("selabel_open", libc::EIO))?;
        if let Some(loaded) = slot.as_ref() {
            return Ok(Arc::clone(loaded));
        }

        let policy_type = self.policy_type();
        let dir = FileContexts::contexts_dir(&self.config.selinux_root, &policy_type);
        let loaded = Arc::new(FileContexts::load(&dir)?);

        tracing::debug!(
            policy_type = %policy_type,
            path = %loaded.source().display(),
            specs = loaded.len(),
            "loaded file_contexts"
        );
        self.tx.emit_label(LabelEvent::PolicyLoaded {
            policy_type,
            path: loaded.source().to_path_buf(),
            specs: loaded.len(),
            substitutions: loaded.substitutions(),
        });

        *slot = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    fn attr_path(&self, attribute: &str) -> PathBuf {
        let thread_self = self.config.procfs_root.join("thread-self");
        if thread_self.exists() {
            thread_self.join("attr").join(attribute)
        } else {
            // Kernels before 3.17 have no thread-self link.
            self.config
                .procfs_root
                .join("self")
                .join("task")
                .join(current_tid().to_string())
                .join("attr")
                .join(attribute)
        }
    }

    fn read_attr(&self, attribute: &str, operation: &str) -> Result<Option<SecurityContext>, LabelError> {
        let raw = std::fs::read(self.attr_path(attribute))
            .map_err(|e| LabelError::from_io(operation, &e))?;
        Ok(codec::decode(&raw).map(SecurityContext::new))
    }
}

impl std::fmt::Debug for LinuxLabelOperations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinuxLabelOperations")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LabelOperations for LinuxLabelOperations {
    fn current_context(&self, form: ContextForm) -> Result<Option<SecurityContext>, LabelError> {
        // No translation daemon support; both forms read the kernel value.
        let operation = match form {
            ContextForm::Translated => "getcon",
            ContextForm::Raw => "getcon_raw",
        };
        self.read_attr("current", operation)
    }

    fn file_context(
        &self,
        path: &CStr,
        follow: Follow,
    ) -> Result<Option<SecurityContext>, LabelError> {
        let operation = match follow {
            Follow::Symlinks => "getfilecon",
            Follow::NoSymlinks => "lgetfilecon",
        };
        let get = |buf: *mut libc::c_void, len: usize| -> libc::ssize_t {
            // SAFETY: `path` and the attribute name are NUL-terminated and
            // `buf` is either null with len 0 or valid for `len` bytes.
            unsafe {
                match follow {
                    Follow::Symlinks => libc::getxattr(path.as_ptr(), XATTR_NAME.as_ptr(), buf, len),
                    Follow::NoSymlinks => {
                        libc::lgetxattr(path.as_ptr(), XATTR_NAME.as_ptr(), buf, len)
                    }
                }
            }
        };

        let mut buffer = LabelBuffer::new(operation, LabelBuffer::INITIAL_LEN)?;
        loop {
            let len = buffer.len();
            let ret = get(buffer.as_mut_slice().as_mut_ptr().cast(), len);
            if let Ok(written) = usize::try_from(ret) {
                buffer.truncate(written);
                return Ok(buffer.into_context());
            }

            let err = std::io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::ENODATA) => return Ok(None),
                Some(libc::ERANGE) => {
                    // Label grew past the buffer; ask for the exact size.
                    let needed = get(std::ptr::null_mut(), 0);
                    let needed = usize::try_from(needed)
                        .map_err(|_| LabelError::last_os_error(operation))?;
                    buffer.resize(needed.max(1))?;
                }
                _ => return Err(LabelError::from_io(operation, &err)),
            }
        }
    }

    fn peer_context(&self, socket: BorrowedFd<'_>) -> Result<Option<SecurityContext>, LabelError> {
        const OPERATION: &str = "getpeercon";

        let mut buffer = LabelBuffer::new(OPERATION, LabelBuffer::INITIAL_LEN)?;
        loop {
            let mut len = libc::socklen_t::try_from(buffer.len())
                .map_err(|_| LabelError::from_errno(OPERATION, libc::ERANGE))?;
            // SAFETY: the buffer is valid for `len` bytes and the kernel
            // writes back at most that many.
            let ret = unsafe {
                libc::getsockopt(
                    socket.as_raw_fd(),
                    libc::SOL_SOCKET,
                    libc::SO_PEERSEC,
                    buffer.as_mut_slice().as_mut_ptr().cast(),
                    &mut len,
                )
            };
            if ret == 0 {
                buffer.truncate(len as usize);
                return Ok(buffer.into_context());
            }

            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ERANGE) && len as usize > buffer.len() {
                // The kernel reported the size it needs in `len`.
                buffer.resize(len as usize)?;
                continue;
            }
            return Err(LabelError::from_io(OPERATION, &err));
        }
    }

    fn match_path_context(
        &self,
        path: &str,
        kind: Option<FileKind>,
    ) -> Result<Option<SecurityContext>, LabelError> {
        self.file_contexts()?.lookup(path, kind)
    }

    fn set_attribute(
        &self,
        attribute: ContextAttribute,
        context: Option<&CStr>,
    ) -> Result<(), LabelError> {
        let operation = match attribute {
            ContextAttribute::Exec => "setexeccon",
            ContextAttribute::FsCreate => "setfscreatecon",
            ContextAttribute::SockCreate => "setsockcreatecon",
        };

        let path = self.attr_path(attribute.as_str());
        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|e| LabelError::from_io(operation, &e))?;

        // The kernel takes the whole value in one write, terminator
        // included. An empty write resets the attribute.
        let bytes = context.map_or(&[][..], CStr::to_bytes_with_nul);
        loop {
            // SAFETY: `bytes` is a live slice for the duration of the call.
            let ret = unsafe { libc::write(file.as_raw_fd(), bytes.as_ptr().cast(), bytes.len()) };
            if ret >= 0 {
                break;
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                return Err(LabelError::from_io(operation, &err));
            }
        }

        let context = context.map(|c| c.to_string_lossy().into_owned());
        tracing::debug!(attribute = attribute.as_str(), context = ?context, "attribute changed");
        self.tx.emit_label(LabelEvent::AttributeChanged { attribute, context });
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        Path::new(fixed_paths::SELINUXFS_MOUNT).join("enforce").exists()
    }
}

fn current_tid() -> libc::pid_t {
    // SAFETY: gettid takes no arguments and cannot fail.
    let tid = unsafe { libc::syscall(libc::SYS_gettid) };
    libc::pid_t::try_from(tid).unwrap_or(libc::pid_t::MAX)
}
