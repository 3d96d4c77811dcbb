//! Integration tests for the dispatch bridge

#[cfg(test)]
mod tests {
    use seclabel_dispatch::*;
    use seclabel_errors::LabelError;
    use seclabel_events::{AppEvent, ContextAttribute, LabelEvent};
    use seclabel_platform::{
        ContextForm, FileKind, Follow, LabelOperations, SecurityContext,
    };
    use std::collections::HashSet;
    use std::ffi::CStr;
    use std::os::fd::{AsRawFd, BorrowedFd};
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Backend that echoes the path and can be told to panic or stall
    #[derive(Default)]
    struct FakeOps {
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl LabelOperations for FakeOps {
        fn current_context(&self, _: ContextForm) -> Result<Option<SecurityContext>, LabelError> {
            Ok(None)
        }

        fn file_context(&self, _: &CStr, _: Follow) -> Result<Option<SecurityContext>, LabelError> {
            Ok(None)
        }

        fn peer_context(&self, socket: BorrowedFd<'_>) -> Result<Option<SecurityContext>, LabelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(socket.as_raw_fd() >= 0);
            Ok(Some(SecurityContext::new("system_u:system_r:sshd_t:s0")))
        }

        fn match_path_context(
            &self,
            path: &str,
            _: Option<FileKind>,
        ) -> Result<Option<SecurityContext>, LabelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            match path {
                "/panic" => panic!("backend exploded"),
                "/none" => Ok(None),
                "/missing" => Err(LabelError::from_errno("matchpathcon", libc::ENOENT)),
                _ => Ok(Some(SecurityContext::new(format!("ctx:{path}")))),
            }
        }

        fn set_attribute(&self, _: ContextAttribute, _: Option<&CStr>) -> Result<(), LabelError> {
            Ok(())
        }

        fn is_enabled(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct Handle {
        liveness: Liveness,
    }

    impl Owner for Handle {
        fn liveness(&self) -> &Liveness {
            &self.liveness
        }
    }

    /// Pool that loses every job, like a runtime that is shutting down
    struct DroppingPool;

    impl WorkerPool for DroppingPool {
        fn submit(&self, job: Job) {
            drop(job);
        }
    }

    fn path_request(
        dispatcher: &Dispatcher,
        owner: Arc<dyn Owner>,
        path: &str,
        results: &Arc<Mutex<Vec<Outcome>>>,
    ) -> RequestId {
        let sink = Arc::clone(results);
        dispatcher.dispatch(
            owner,
            Operation::ResolvePathContext,
            DispatchInput::Path(path.to_string()),
            Box::new(move |outcome| sink.lock().unwrap().push(outcome)),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ten_thousand_requests_complete_exactly_once() {
        let mut run_loop = RunLoop::new();
        let ops = Arc::new(FakeOps::default());
        let dispatcher = Dispatcher::new(
            ops.clone(),
            Arc::new(TokioPool::current().unwrap()),
            Arc::new(run_loop.handle()),
        );
        let handle = Arc::new(Handle::default());
        let seen = Arc::new(Mutex::new(HashSet::new()));
        let completions = Arc::new(AtomicUsize::new(0));

        for i in 0..10_000 {
            let seen = Arc::clone(&seen);
            let completions = Arc::clone(&completions);
            let path = format!("/data/{i}");
            let expected = format!("ctx:{path}");
            dispatcher.dispatch(
                handle.clone(),
                Operation::ResolvePathContext,
                DispatchInput::Path(path),
                Box::new(move |outcome| {
                    assert_eq!(outcome.unwrap().unwrap().as_str(), expected);
                    assert!(seen.lock().unwrap().insert(expected));
                    completions.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        assert_eq!(run_loop.run().await, 10_000);
        assert_eq!(completions.load(Ordering::SeqCst), 10_000);
        assert_eq!(seen.lock().unwrap().len(), 10_000);
        assert_eq!(ops.calls.load(Ordering::SeqCst), 10_000);
        assert!(handle.liveness.is_idle());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_owner_outlives_caller_reference() {
        let mut run_loop = RunLoop::new();
        let dispatcher = Dispatcher::new(
            Arc::new(FakeOps {
                delay: Some(Duration::from_millis(50)),
                ..FakeOps::default()
            }),
            Arc::new(TokioPool::current().unwrap()),
            Arc::new(run_loop.handle()),
        );
        let results = Arc::new(Mutex::new(Vec::new()));

        let handle = Arc::new(Handle::default());
        let weak = Arc::downgrade(&handle);
        path_request(&dispatcher, handle, "/etc/hosts", &results);

        // The caller dropped its only reference; the request keeps it alive.
        assert!(weak.upgrade().is_some());

        run_loop.run().await;
        assert_eq!(results.lock().unwrap().len(), 1);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_outcomes_are_delivered_unchanged() {
        let scheduler = Arc::new(ManualScheduler::new());
        let dispatcher = Dispatcher::new(
            Arc::new(FakeOps::default()),
            Arc::new(InlinePool),
            scheduler.clone(),
        );
        let handle: Arc<dyn Owner> = Arc::new(Handle::default());
        let results = Arc::new(Mutex::new(Vec::new()));

        for path in ["/etc", "/none", "/missing"] {
            path_request(&dispatcher, handle.clone(), path, &results);
        }
        scheduler.run_all();

        let results = results.lock().unwrap();
        assert_eq!(results[0], Ok(Some(SecurityContext::new("ctx:/etc"))));
        assert_eq!(results[1], Ok(None));
        assert_eq!(results[2].as_ref().unwrap_err().errno(), Some(libc::ENOENT));
    }

    #[test]
    fn test_peer_request_uses_duplicated_descriptor() {
        let scheduler = Arc::new(ManualScheduler::new());
        let ops = Arc::new(FakeOps::default());
        let dispatcher = Dispatcher::new(ops.clone(), Arc::new(InlinePool), scheduler.clone());
        let handle: Arc<dyn Owner> = Arc::new(Handle::default());
        let results = Arc::new(Mutex::new(Vec::new()));

        let (a, _b) = UnixStream::pair().unwrap();
        let sink = Arc::clone(&results);
        dispatcher.dispatch(
            handle,
            Operation::ResolvePeerContext,
            DispatchInput::Socket(a.as_raw_fd()),
            Box::new(move |outcome| sink.lock().unwrap().push(outcome)),
        );
        // Closing the caller's end does not affect the request's copy.
        drop(a);
        scheduler.run_all();

        assert_eq!(ops.calls.load(Ordering::SeqCst), 1);
        assert!(results.lock().unwrap()[0].is_ok());
    }

    #[test]
    fn test_worker_panic_becomes_error() {
        let scheduler = Arc::new(ManualScheduler::new());
        let dispatcher = Dispatcher::new(
            Arc::new(FakeOps::default()),
            Arc::new(InlinePool),
            scheduler.clone(),
        );
        let handle = Arc::new(Handle::default());
        let results = Arc::new(Mutex::new(Vec::new()));

        path_request(&dispatcher, handle.clone(), "/panic", &results);
        scheduler.run_all();

        let results = results.lock().unwrap();
        match &results[0] {
            Err(LabelError::WorkerPanicked { operation, message }) => {
                assert_eq!(operation, "matchpathcon");
                assert_eq!(message, "backend exploded");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(handle.liveness.is_idle());
    }

    #[test]
    fn test_dropped_job_reports_worker_unavailable() {
        let scheduler = Arc::new(ManualScheduler::new());
        let ops = Arc::new(FakeOps::default());
        let dispatcher = Dispatcher::new(ops.clone(), Arc::new(DroppingPool), scheduler.clone());
        let handle = Arc::new(Handle::default());
        let results = Arc::new(Mutex::new(Vec::new()));

        path_request(&dispatcher, handle.clone(), "/etc", &results);
        assert_eq!(scheduler.reserved(), 0);
        assert_eq!(handle.liveness.outstanding(), 1);

        assert_eq!(scheduler.run_all(), 1);
        assert_eq!(ops.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            results.lock().unwrap()[0],
            Err(LabelError::WorkerUnavailable { .. })
        ));
        assert!(handle.liveness.is_idle());
    }

    #[test]
    fn test_completion_panic_propagates_and_releases_owner() {
        let mut run_loop = RunLoop::new();
        let dispatcher = Dispatcher::new(
            Arc::new(FakeOps::default()),
            Arc::new(InlinePool),
            Arc::new(run_loop.handle()),
        );
        let handle = Arc::new(Handle::default());

        dispatcher.dispatch(
            handle.clone(),
            Operation::ResolvePathContext,
            DispatchInput::Path("/etc".into()),
            Box::new(|_| panic!("host callback threw")),
        );

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            run_loop.run_blocking()
        }));
        assert!(result.is_err());
        assert!(handle.liveness.is_idle());
        assert_eq!(Arc::strong_count(&handle), 1);
        assert_eq!(run_loop.pending(), 0);
    }

    #[test]
    fn test_events_follow_request_lifecycle() {
        let scheduler = Arc::new(ManualScheduler::new());
        let (tx, mut rx) = seclabel_events::channel();
        let dispatcher = Dispatcher::new(
            Arc::new(FakeOps::default()),
            Arc::new(InlinePool),
            scheduler.clone(),
        )
        .with_event_sender(tx);
        let results = Arc::new(Mutex::new(Vec::new()));

        let id = path_request(&dispatcher, Arc::new(Handle::default()), "/etc", &results);
        scheduler.run_all();

        let dispatched = rx.try_recv().unwrap();
        assert_eq!(dispatched.meta.correlation_id, Some(id.to_string()));
        assert!(matches!(
            dispatched.event,
            AppEvent::Label(LabelEvent::RequestDispatched { .. })
        ));
        let completed = rx.try_recv().unwrap();
        assert!(matches!(
            completed.event,
            AppEvent::Label(LabelEvent::RequestCompleted { labeled: true, .. })
        ));
    }
}
