//! Owned copies of caller file descriptors
//!
//! An async lookup may outlive the caller's handle to the socket, so the
//! worker gets its own descriptor.

use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use seclabel_errors::LabelError;

/// Duplicate a descriptor given as a bare integer by the host
///
/// # Errors
///
/// Returns `InvalidArgument` for a negative value and `EBADF` from the
/// kernel if the number is not an open descriptor.
pub fn duplicate_raw(fd: RawFd) -> Result<OwnedFd, LabelError> {
    if fd < 0 {
        return Err(LabelError::invalid_argument("Must supply a filedescriptor."));
    }

    // SAFETY: fcntl only inspects the descriptor table; an invalid fd yields
    // EBADF rather than undefined behavior.
    let dup = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
    if dup < 0 {
        return Err(LabelError::last_os_error("getpeercon"));
    }

    // SAFETY: `dup` was just returned by F_DUPFD_CLOEXEC and nothing else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(dup) })
}
