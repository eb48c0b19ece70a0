//! Tests for `src/logging.rs`.

use sharebot::logging::LoggingGuard;

#[test]
fn logging_guard_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LoggingGuard>();
}

#[test]
fn init_service_creates_logs_dir() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs_dir = tmp.path().join("nested").join("logs");
    assert!(!logs_dir.exists());

    // Only one global subscriber per process, so the result may be an Err
    // if another test got there first. The directory is created either way.
    let _result = sharebot::logging::init_service(&logs_dir);
    assert!(logs_dir.exists(), "logs directory should be created");
}

#[test]
fn init_console_tolerates_repeat_calls() {
    sharebot::logging::init_console();
    sharebot::logging::init_console();
    tracing::info!("still logging");
}

#[test]
fn service_log_file_uses_the_bot_prefix() {
    let tmp = tempfile::tempdir().expect("should create temp dir");

    // The appender opens its file before the subscriber is installed.
    let _result = sharebot::logging::init_service(tmp.path());

    let names: Vec<String> = std::fs::read_dir(tmp.path())
        .expect("should list logs dir")
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    assert!(
        names.iter().any(|n| n.starts_with(sharebot::logging::LOG_FILE_PREFIX)),
        "no log file in {names:?}"
    );
}
