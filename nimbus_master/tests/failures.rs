extern crate nimbus_core;
extern crate nimbus_master;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nimbus_core::types::{AccessMode, DataDescription, ImplementationSpec, JobEndStatus,
                         MethodResourceDescription, OnFailure, ParamSpec, TaskId, TaskSpec,
                         WorkerDescription};
use nimbus_master::config::RuntimeConfig;
use nimbus_master::graph::app::TaskMonitor;
use nimbus_master::jobs::{LocalAdapter, LocalOutcome};
use nimbus_master::runtime::{local_runtime, DoNothingApplicationRunner, DoNothingTaskMonitor,
                             Runtime};

fn start(cfg: RuntimeConfig) -> (Runtime, Arc<LocalAdapter>) {
    let (runtime, adapter) = local_runtime(cfg, 4);
    runtime.add_worker(
        "w0",
        WorkerDescription::Method(MethodResourceDescription::new(4)),
        "local",
    );
    (runtime, adapter)
}

fn spec(signature: &str, on_failure: OnFailure, data: DataDescription, mode: AccessMode) -> TaskSpec {
    TaskSpec::new(0, signature, vec![ImplementationSpec::method(0, signature, 1)])
        .with_param(ParamSpec::dependency(mode, data))
        .with_on_failure(on_failure)
}

/// Monitor counting terminal callbacks through shared atomics.
struct CountingMonitor {
    completed: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
    cancelled: Arc<AtomicUsize>,
    exceptions: Arc<AtomicUsize>,
}

impl TaskMonitor for CountingMonitor {
    fn on_completion(&mut self, _task: TaskId) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_failure(&mut self, _task: TaskId) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_cancellation(&mut self, _task: TaskId) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }
    fn on_exception(&mut self, _task: TaskId, _message: &str) {
        self.exceptions.fetch_add(1, Ordering::SeqCst);
    }
}

struct Counters {
    completed: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
    cancelled: Arc<AtomicUsize>,
    exceptions: Arc<AtomicUsize>,
}

fn counting_app(runtime: &Runtime) -> (u64, Counters) {
    let counters = Counters {
        completed: Arc::new(AtomicUsize::new(0)),
        failed: Arc::new(AtomicUsize::new(0)),
        cancelled: Arc::new(AtomicUsize::new(0)),
        exceptions: Arc::new(AtomicUsize::new(0)),
    };
    let monitor = CountingMonitor {
        completed: counters.completed.clone(),
        failed: counters.failed.clone(),
        cancelled: counters.cancelled.clone(),
        exceptions: counters.exceptions.clone(),
    };
    let app = runtime.register_application(
        None,
        "failures",
        Box::new(monitor),
        Arc::new(DoNothingApplicationRunner),
    );
    (app, counters)
}

fn register_boom(adapter: &Arc<LocalAdapter>) {
    adapter.register_core_element("boom", |_job| LocalOutcome::Failure {
        status: JobEndStatus::ExecutionFailed,
        message: "synthetic failure".to_string(),
    });
}

#[test]
fn ignored_failures_do_not_poison_the_runtime() {
    let (runtime, adapter) = start(RuntimeConfig::default());
    register_boom(&adapter);
    let (app, counters) = counting_app(&runtime);

    let data = DataDescription::Object { code: 1 };
    runtime.submit_task(app, spec("boom", OnFailure::Ignore, data.clone(), AccessMode::W));
    // The reader is scheduled against the empty produced version
    runtime.submit_task(app, spec("noop", OnFailure::Retry, data, AccessMode::R));

    runtime.barrier(app).unwrap();
    assert_eq!(counters.failed.load(Ordering::SeqCst), 1);
    assert_eq!(counters.completed.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.shutdown(), 0);
}

#[test]
fn fail_policy_reaches_the_error_manager() {
    let (runtime, adapter) = start(RuntimeConfig::default());
    register_boom(&adapter);
    let (app, counters) = counting_app(&runtime);

    let data = DataDescription::Object { code: 1 };
    runtime.submit_task(app, spec("boom", OnFailure::Fail, data, AccessMode::W));
    runtime.barrier(app).unwrap();

    assert_eq!(counters.failed.load(Ordering::SeqCst), 1);
    assert!(runtime.fatal_reached());
    assert_eq!(runtime.shutdown(), 1);
}

#[test]
fn cancel_successors_cuts_the_chain() {
    let (runtime, adapter) = start(RuntimeConfig::default());
    register_boom(&adapter);
    let (app, counters) = counting_app(&runtime);

    let data = DataDescription::Object { code: 1 };
    runtime.submit_task(
        app,
        spec("boom", OnFailure::CancelSuccessors, data.clone(), AccessMode::W),
    );
    // Both successors depend on the failed write
    runtime.submit_task(app, spec("noop", OnFailure::Retry, data.clone(), AccessMode::RW));
    runtime.submit_task(app, spec("noop", OnFailure::Retry, data, AccessMode::R));

    runtime.barrier(app).unwrap();
    assert_eq!(counters.failed.load(Ordering::SeqCst), 1);
    assert_eq!(counters.cancelled.load(Ordering::SeqCst), 2);
    // CANCEL_SUCCESSORS is a continue-with-missing-outputs policy
    assert_eq!(runtime.shutdown(), 0);
}

#[test]
fn group_exception_cancels_the_group() {
    let (runtime, adapter) = start(RuntimeConfig::default());
    adapter.register_core_element("raise", |_job| LocalOutcome::Exception {
        message: "user exception".to_string(),
    });
    adapter.register_core_element("linger", |_job| {
        std::thread::sleep(Duration::from_millis(40));
        LocalOutcome::Success {
            outputs: HashMap::new(),
        }
    });
    let (app, counters) = counting_app(&runtime);

    runtime.open_task_group(app, "phase-1");
    for i in 0..3 {
        let data = DataDescription::Object { code: 10 + i };
        runtime.submit_task(app, spec("linger", OnFailure::Retry, data, AccessMode::W));
    }
    let data = DataDescription::Object { code: 99 };
    runtime.submit_task(app, spec("raise", OnFailure::Retry, data, AccessMode::W));
    runtime.close_current_task_group(app);

    let err = runtime.barrier_group(app, "phase-1").unwrap_err();
    let rendered = format!("{}", err);
    assert!(rendered.contains("user exception"), "got: {}", rendered);
    assert_eq!(counters.exceptions.load(Ordering::SeqCst), 1);

    runtime.barrier(app).unwrap();
    // The exception itself is not fatal
    assert_eq!(runtime.shutdown(), 0);
}

#[test]
fn cancelling_an_application_is_idempotent() {
    let (runtime, adapter) = start(RuntimeConfig::default());
    adapter.register_core_element("linger", |_job| {
        std::thread::sleep(Duration::from_millis(30));
        LocalOutcome::Success {
            outputs: HashMap::new(),
        }
    });
    let (app, counters) = counting_app(&runtime);

    for i in 0..4 {
        let data = DataDescription::Object { code: i };
        runtime.submit_task(app, spec("linger", OnFailure::Retry, data, AccessMode::W));
    }
    runtime.cancel_application_tasks(app);
    runtime.cancel_application_tasks(app);
    runtime.barrier(app).unwrap();

    let cancelled = counters.cancelled.load(Ordering::SeqCst);
    let completed = counters.completed.load(Ordering::SeqCst);
    assert_eq!(cancelled + completed, 4);
    assert_eq!(runtime.shutdown(), 0);
}

#[test]
fn blocked_task_fails_alone() {
    let (runtime, _adapter) = start(RuntimeConfig::default());
    let (app, counters) = counting_app(&runtime);

    // Requires 64 CPUs; the only worker has 4: no compatible resource
    let data = DataDescription::Object { code: 1 };
    let task = TaskSpec::new(0, "huge", vec![ImplementationSpec::method(0, "huge", 64)])
        .with_param(ParamSpec::dependency(AccessMode::W, data));
    runtime.submit_task(app, task);

    runtime.barrier(app).unwrap();
    assert_eq!(counters.failed.load(Ordering::SeqCst), 1);
    // Blocked is fatal for the task only
    assert_eq!(runtime.shutdown(), 0);
}
