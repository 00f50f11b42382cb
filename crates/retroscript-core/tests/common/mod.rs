//! Shared helpers for retroscript-core integration tests.

use std::rc::Rc;

use retroscript_core::host::RecordingHost;
use retroscript_core::{run, ErrorKind, RunOptions, RunOutcome};

/// Runs `source` with default options and asserts it succeeded.
pub async fn run_ok(source: &str) -> RunOutcome {
    let outcome = run(source, RunOptions::default()).await;
    assert!(
        outcome.success,
        "script failed: {:?}\n--- source ---\n{}",
        outcome.error, source
    );
    outcome
}

/// Printed lines of a script that must succeed.
pub async fn output_of(source: &str) -> Vec<String> {
    run_ok(source).await.output
}

/// Runs `source`, asserts it failed at runtime and returns the error kind.
pub async fn runtime_error_kind(source: &str) -> ErrorKind {
    let outcome = run(source, RunOptions::default()).await;
    assert!(!outcome.success, "expected failure, got output {:?}", outcome.output);
    outcome
        .error
        .as_ref()
        .and_then(|e| e.kind())
        .unwrap_or_else(|| panic!("expected a runtime error, got {:?}", outcome.error))
}

/// Runs `source` against a [`RecordingHost`] prepared by `setup`.
pub async fn run_recorded(
    source: &str,
    setup: impl FnOnce(&RecordingHost),
) -> (RunOutcome, Rc<RecordingHost>) {
    let host = Rc::new(RecordingHost::new());
    setup(&host);
    let options = RunOptions::new().with_host(host.clone());
    let outcome = run(source, options).await;
    (outcome, host)
}
