//! RAII guard keeping the initiating object alive across an async request

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Count of outstanding requests holding an owner alive
#[derive(Debug, Default)]
pub struct Liveness {
    outstanding: AtomicUsize,
}

impl Liveness {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests currently holding a guard
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.outstanding() == 0
    }
}

/// An object that starts async requests and must outlive them.
pub trait Owner: Send + Sync + 'static {
    fn liveness(&self) -> &Liveness;
}

/// Holds a strong reference to the owner and marks it live.
///
/// One increment per guard, one decrement when the guard drops, including
/// during unwinding.
pub struct LifetimeGuard {
    owner: Arc<dyn Owner>,
}

impl LifetimeGuard {
    /// Take a strong reference and bump the owner's liveness count
    #[must_use]
    pub fn acquire(owner: Arc<dyn Owner>) -> Self {
        owner.liveness().outstanding.fetch_add(1, Ordering::AcqRel);
        Self { owner }
    }

    #[must_use]
    pub fn owner(&self) -> &Arc<dyn Owner> {
        &self.owner
    }
}

impl Clone for LifetimeGuard {
    fn clone(&self) -> Self {
        Self::acquire(Arc::clone(&self.owner))
    }
}

impl Drop for LifetimeGuard {
    fn drop(&mut self) {
        self.owner.liveness().outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for LifetimeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifetimeGuard")
            .field("outstanding", &self.owner.liveness().outstanding())
            .finish()
    }
}
