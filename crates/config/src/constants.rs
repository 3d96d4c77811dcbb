//! Fixed locations of the labeling subsystem
//!
//! These are the kernel and distribution defaults. The configurable ones
//! (`selinux_root`, `procfs_root`) only default to these values.

pub const SELINUX_ROOT: &str = "/etc/selinux";
pub const SELINUXFS_MOUNT: &str = "/sys/fs/selinux";
pub const PROCFS_ROOT: &str = "/proc";

pub const DEFAULT_POLICY_TYPE: &str = "targeted";

/// Longest path accepted by the async path resolver (Linux `PATH_MAX`)
pub const PATH_MAX: usize = 4096;
