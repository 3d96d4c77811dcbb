//! Single-threaded completion context
//!
//! Workers never run completions themselves. They hand a task to a
//! [`Scheduler`], and whoever drives the scheduler runs it. Each dispatch
//! calls [`Scheduler::reserve`] up front so the driver knows a task is still
//! coming while the worker is busy.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Work to run on the single-threaded context
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Capability to run a task on the single-threaded context.
///
/// Every `reserve` must be followed by exactly one `schedule`.
pub trait Scheduler: Send + Sync {
    /// Announce a task that will be scheduled later
    fn reserve(&self);

    /// Deliver a reserved task; callable from any thread
    fn schedule(&self, task: Task);
}

/// Cloneable sending side of a [`RunLoop`]
#[derive(Clone, Debug)]
pub struct LoopHandle {
    tx: UnboundedSender<Task>,
    pending: Arc<AtomicUsize>,
}

impl Scheduler for LoopHandle {
    fn reserve(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    fn schedule(&self, task: Task) {
        if self.tx.send(task).is_err() {
            // The loop is gone; the task drops here with everything it owns.
            tracing::warn!("run loop closed, dropping completion");
            let _ = self
                .pending
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        }
    }
}

/// Drains scheduled tasks on the thread that runs it.
///
/// [`RunLoop::run`] returns once every reserved task has run, the way an
/// event loop exits when no handles are left.
#[derive(Debug)]
pub struct RunLoop {
    handle: LoopHandle,
    rx: UnboundedReceiver<Task>,
}

/// Marks one reserved task as delivered, even if it panicked.
struct Delivered<'a>(&'a AtomicUsize);

impl Drop for Delivered<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl RunLoop {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handle: LoopHandle {
                tx,
                pending: Arc::new(AtomicUsize::new(0)),
            },
            rx,
        }
    }

    /// Scheduler to hand to a dispatcher
    #[must_use]
    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Reserved tasks that have not run yet
    #[must_use]
    pub fn pending(&self) -> usize {
        self.handle.pending.load(Ordering::Acquire)
    }

    fn run_task(&self, task: Task) {
        let _delivered = Delivered(&self.handle.pending);
        task();
    }

    /// Run tasks until none are reserved. Returns how many ran.
    ///
    /// A panicking task unwinds out of this call.
    pub async fn run(&mut self) -> usize {
        let mut ran = 0;
        while self.pending() > 0 {
            let Some(task) = self.rx.recv().await else {
                break;
            };
            self.run_task(task);
            ran += 1;
        }
        ran
    }

    /// Blocking form of [`RunLoop::run`] for threads outside a runtime.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async execution context.
    pub fn run_blocking(&mut self) -> usize {
        let mut ran = 0;
        while self.pending() > 0 {
            let Some(task) = self.rx.blocking_recv() else {
                break;
            };
            self.run_task(task);
            ran += 1;
        }
        ran
    }

}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

/// Scheduler that queues tasks until the test runs them
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<Task>>,
    reserved: AtomicUsize,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reservations not yet matched by a scheduled task
    #[must_use]
    pub fn reserved(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    /// Tasks waiting to run
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.lock().map_or(0, |queue| queue.len())
    }

    /// Run the oldest queued task, if any
    pub fn run_next(&self) -> bool {
        let task = match self.queue.lock() {
            Ok(mut queue) => queue.pop_front(),
            Err(_) => None,
        };
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run queued tasks until the queue is empty. Returns how many ran.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl Scheduler for ManualScheduler {
    fn reserve(&self) {
        self.reserved.fetch_add(1, Ordering::AcqRel);
    }

    fn schedule(&self, task: Task) {
        self.reserved.fetch_sub(1, Ordering::AcqRel);
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(task);
        }
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("reserved", &self.reserved())
            .field("queued", &self.queued())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn run_returns_when_nothing_reserved() {
        let mut run_loop = RunLoop::new();
        assert_eq!(run_loop.run_blocking(), 0);
    }

    #[test]
    fn run_waits_for_reserved_tasks() {
        let mut run_loop = RunLoop::new();
        let handle = run_loop.handle();
        let ran = Arc::new(AtomicBool::new(false));

        handle.reserve();
        let flag = Arc::clone(&ran);
        let worker = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            handle.schedule(Box::new(move || flag.store(true, Ordering::SeqCst)));
        });

        assert_eq!(run_loop.run_blocking(), 1);
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(run_loop.pending(), 0);
        worker.join().unwrap();
    }

    #[test]
    fn panicking_task_still_counts_as_delivered() {
        let mut run_loop = RunLoop::new();
        let handle = run_loop.handle();
        handle.reserve();
        handle.schedule(Box::new(|| panic!("host callback threw")));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            run_loop.run_blocking()
        }));
        assert!(result.is_err());
        assert_eq!(run_loop.pending(), 0);
    }

    #[test]
    fn manual_scheduler_runs_in_order() {
        let scheduler = ManualScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            scheduler.reserve();
            let order = Arc::clone(&order);
            scheduler.schedule(Box::new(move || order.lock().unwrap().push(i)));
        }
        assert_eq!(scheduler.reserved(), 0);
        assert_eq!(scheduler.queued(), 3);
        assert_eq!(scheduler.run_all(), 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }
}
