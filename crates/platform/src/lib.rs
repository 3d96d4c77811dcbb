//! Access to OS security labels.
//!
//! This crate owns every call into the labeling subsystem:
//! - [`LabelOperations`]: one blocking call per method, errno preserved
//! - [`LinuxLabelOperations`]: procfs, xattr and `SO_PEERSEC` backend plus
//!   the file_contexts policy database
//! - [`codec`]: native buffers to host values and back
//!
//! Nothing here is async; the dispatch crate moves these calls off the
//! caller's thread.

pub mod codec;
pub mod context;
pub mod fd;
pub mod linux;
pub mod operations;

pub use codec::LabelBuffer;
pub use context::SecurityContext;
pub use linux::{FileContexts, LinuxLabelOperations};
pub use operations::{ContextForm, FileKind, Follow, LabelOperations};
