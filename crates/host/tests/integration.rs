//! Integration tests for the host API

#[cfg(test)]
mod tests {
    use seclabel_config::{Config, PolicyConfig};
    use seclabel_dispatch::{InlinePool, ManualScheduler, RunLoop};
    use seclabel_errors::LabelError;
    use seclabel_events::{AppEvent, ContextAttribute, LabelEvent};
    use seclabel_host::*;
    use seclabel_platform::{FileContexts, LinuxLabelOperations, SecurityContext};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    const FILE_CONTEXTS: &str = "\
/.*                 system_u:object_r:default_t:s0
/etc(/.*)?          system_u:object_r:etc_t:s0
/etc/passwd     --  system_u:object_r:passwd_file_t:s0
/proc(/.*)?         <<none>>
";

    /// procfs and policy root laid out under a temp directory
    struct Fixture {
        root: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let attr = root.path().join("proc/thread-self/attr");
            std::fs::create_dir_all(&attr).unwrap();
            std::fs::write(attr.join("current"), b"unconfined_u:unconfined_r:unconfined_t:s0\0")
                .unwrap();
            for name in ["exec", "fscreate", "sockcreate"] {
                std::fs::write(attr.join(name), b"").unwrap();
            }

            let files = FileContexts::contexts_dir(&root.path().join("selinux"), "targeted");
            std::fs::create_dir_all(&files).unwrap();
            std::fs::write(files.join("file_contexts"), FILE_CONTEXTS).unwrap();
            Self { root }
        }

        fn policy(&self) -> PolicyConfig {
            PolicyConfig {
                selinux_root: self.root.path().join("selinux"),
                policy_type: None,
                procfs_root: self.root.path().join("proc"),
            }
        }

        fn attr(&self, name: &str) -> Vec<u8> {
            std::fs::read(self.root.path().join("proc/thread-self/attr").join(name)).unwrap()
        }

        fn selinux(&self, scheduler: Arc<ManualScheduler>) -> Arc<SELinux> {
            Arc::new(SELinux::new(
                Arc::new(LinuxLabelOperations::new(self.policy())),
                Arc::new(InlinePool),
                scheduler,
            ))
        }
    }

    type Calls = Arc<Mutex<Vec<(Value, Value)>>>;

    fn callback(calls: &Calls) -> Option<HostCallback> {
        let calls = Arc::clone(calls);
        Some(Box::new(move |err, result| calls.lock().unwrap().push((err, result))))
    }

    #[test]
    fn test_sync_methods_through_table() {
        let fixture = Fixture::new();
        let (tx, mut rx) = seclabel_events::channel();
        let selinux = SELinux::new(
            Arc::new(LinuxLabelOperations::new(fixture.policy()).with_event_sender(tx)),
            Arc::new(InlinePool),
            Arc::new(ManualScheduler::new()),
        );

        assert_eq!(
            selinux.call("getcon", &[]).unwrap(),
            json!("unconfined_u:unconfined_r:unconfined_t:s0")
        );
        assert_eq!(
            selinux.call("getcon_raw", &[]).unwrap(),
            selinux.call("getcon", &[]).unwrap()
        );

        selinux
            .call("setfscreatecon", &[json!("system_u:object_r:etc_t:s0")])
            .unwrap();
        assert_eq!(fixture.attr("fscreate"), b"system_u:object_r:etc_t:s0\0");

        // A reset is a zero-length write, which a regular file cannot show;
        // check what the backend reported instead.
        selinux.call("setfscreatecon", &[Value::Null]).unwrap();
        let changes: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|message| match message.event {
                AppEvent::Label(LabelEvent::AttributeChanged { attribute, context }) => {
                    Some((attribute, context))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            changes,
            vec![
                (
                    ContextAttribute::FsCreate,
                    Some("system_u:object_r:etc_t:s0".to_string())
                ),
                (ContextAttribute::FsCreate, None),
            ]
        );
    }

    #[test]
    fn test_sync_argument_validation() {
        let fixture = Fixture::new();
        let selinux = fixture.selinux(Arc::new(ManualScheduler::new()));

        let cases = [
            ("setexeccon", vec![], "Must supply a security context."),
            ("setexeccon", vec![json!(42)], "Param must be string."),
            ("setsockcreatecon", vec![json!(["a"])], "Param must be string."),
            ("getfilecon", vec![], "Wrong number of arguments"),
            ("lgetfilecon", vec![json!(false)], "Wrong argument type"),
            ("getfilecon", vec![json!("")], "Must supply a file path."),
        ];
        for (method, args, message) in cases {
            let err = selinux.call(method, &args).unwrap_err();
            assert_eq!(err, LabelError::invalid_argument(message), "{method}");
        }
        // Rejected before any write reached the subsystem.
        assert!(fixture.attr("exec").is_empty());
        assert!(fixture.attr("sockcreate").is_empty());
    }

    #[test]
    fn test_unknown_and_misrouted_methods() {
        let fixture = Fixture::new();
        let selinux = fixture.selinux(Arc::new(ManualScheduler::new()));
        let calls: Calls = Arc::default();

        assert!(selinux.call("getpidcon", &[]).is_err());
        assert!(selinux.call("matchpathcon", &[json!("/etc")]).is_err());
        assert!(selinux.call_async("getcon", &[], callback(&calls)).is_err());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_missing_callback_is_synchronous_error() {
        let fixture = Fixture::new();
        let scheduler = Arc::new(ManualScheduler::new());
        let selinux = fixture.selinux(scheduler.clone());

        let err = selinux
            .call_async("matchpathcon", &[json!("/etc")], None)
            .unwrap_err();
        assert_eq!(err, LabelError::invalid_argument("Argument 1 must be a function"));
        assert_eq!(scheduler.reserved(), 0);
        assert_eq!(scheduler.queued(), 0);
        assert_eq!(selinux.outstanding(), 0);
    }

    #[test]
    fn test_matchpathcon_through_table() {
        let fixture = Fixture::new();
        let scheduler = Arc::new(ManualScheduler::new());
        let selinux = fixture.selinux(scheduler.clone());
        let calls: Calls = Arc::default();

        for path in ["/etc/passwd", "/etc//hosts", "/proc/1/status"] {
            selinux
                .call_async("matchpathcon", &[json!(path)], callback(&calls))
                .unwrap();
        }
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(selinux.outstanding(), 3);

        assert_eq!(scheduler.run_all(), 3);
        let calls = calls.lock().unwrap();
        assert_eq!(calls[0], (Value::Null, json!("system_u:object_r:passwd_file_t:s0")));
        assert_eq!(calls[1], (Value::Null, json!("system_u:object_r:etc_t:s0")));
        assert_eq!(calls[2], (Value::Null, json!("")));
        assert_eq!(selinux.outstanding(), 0);
    }

    #[test]
    fn test_async_argument_errors_arrive_via_callback() {
        let fixture = Fixture::new();
        let scheduler = Arc::new(ManualScheduler::new());
        let selinux = fixture.selinux(scheduler.clone());
        let calls: Calls = Arc::default();

        selinux.call_async("matchpathcon", &[], callback(&calls)).unwrap();
        selinux
            .call_async("matchpathcon", &[json!(7)], callback(&calls))
            .unwrap();
        selinux
            .call_async("getpeercon", &[json!("sock")], callback(&calls))
            .unwrap();
        assert!(calls.lock().unwrap().is_empty());

        scheduler.run_all();
        let calls = calls.lock().unwrap();
        let messages: Vec<_> = calls
            .iter()
            .map(|(err, result)| {
                assert_eq!(*result, Value::Null);
                assert_eq!(err["code"], "label.invalid_argument");
                err["message"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(
            messages,
            [
                "Wrong number of arguments",
                "Wrong argument type",
                "Must supply a filedescriptor."
            ]
        );
    }

    #[test]
    fn test_unmatched_path_reports_enoent() {
        let fixture = Fixture::new();
        std::fs::write(
            FileContexts::contexts_dir(&fixture.policy().selinux_root, "targeted")
                .join("file_contexts"),
            "/etc(/.*)? system_u:object_r:etc_t:s0\n",
        )
        .unwrap();
        let scheduler = Arc::new(ManualScheduler::new());
        let selinux = fixture.selinux(scheduler.clone());
        let results = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&results);
        selinux.resolve_path_context("/usr/bin/true", move |outcome| {
            sink.lock().unwrap().push(outcome);
        });
        scheduler.run_all();

        let results = results.lock().unwrap();
        assert_eq!(results[0].as_ref().unwrap_err().errno(), Some(libc::ENOENT));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_from_config_on_runtime() {
        let fixture = Fixture::new();
        let mut config = Config::default();
        config.policy = fixture.policy();
        config.dispatch.max_path_len = 32;

        let mut run_loop = RunLoop::new();
        let (tx, mut rx) = seclabel_events::channel();
        let selinux = Arc::new(
            SELinux::from_config(&config, Arc::new(run_loop.handle()), Some(tx)).unwrap(),
        );
        let results = Arc::new(Mutex::new(Vec::new()));

        for path in ["/etc/passwd".to_string(), format!("/{}", "x".repeat(40))] {
            let sink = Arc::clone(&results);
            selinux.resolve_path_context(path, move |outcome| sink.lock().unwrap().push(outcome));
        }
        assert_eq!(run_loop.run().await, 2);

        let results = results.lock().unwrap();
        let ok = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok, 1);
        assert!(results
            .iter()
            .any(|r| *r == Ok(Some(SecurityContext::new("system_u:object_r:passwd_file_t:s0")))));
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(LabelError::InvalidArgument { .. }))));

        let mut saw_policy_load = false;
        while let Ok(message) = rx.try_recv() {
            if let seclabel_events::AppEvent::Label(seclabel_events::LabelEvent::PolicyLoaded {
                specs,
                ..
            }) = message.event
            {
                assert_eq!(specs, 4);
                saw_policy_load = true;
            }
        }
        assert!(saw_policy_load);
    }

    #[test]
    fn test_from_config_requires_runtime() {
        let scheduler = Arc::new(ManualScheduler::new());
        let err = SELinux::from_config(&Config::default(), scheduler, None).unwrap_err();
        assert!(matches!(err, LabelError::WorkerUnavailable { .. }));
    }

    #[test]
    fn test_selinux_host_getcon() {
        let scheduler = Arc::new(ManualScheduler::new());
        let selinux = Arc::new(SELinux::new(
            Arc::new(LinuxLabelOperations::new(PolicyConfig::default())),
            Arc::new(InlinePool),
            scheduler,
        ));
        if !selinux.is_enabled() {
            return;
        }
        let context = selinux.get_context().unwrap().unwrap();
        assert!(context.as_str().split(':').count() >= 3);
    }
}
