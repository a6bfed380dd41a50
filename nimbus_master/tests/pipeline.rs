extern crate nimbus_core;
extern crate nimbus_master;
extern crate serde_json;
extern crate tempdir;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nimbus_core::types::{AccessMode, DataDescription, ImplementationSpec,
                         MethodResourceDescription, ParamSpec, TaskSpec, WorkerDescription};
use nimbus_master::config::RuntimeConfig;
use nimbus_master::jobs::{LocalAdapter, LocalOutcome};
use nimbus_master::runtime::{local_runtime, AccessResult, DoNothingApplicationRunner,
                             DoNothingTaskMonitor, Runtime};

fn start(cfg: RuntimeConfig, cpus: u32) -> (Runtime, Arc<LocalAdapter>) {
    let (runtime, adapter) = local_runtime(cfg, 4);
    runtime.add_worker(
        "w0",
        WorkerDescription::Method(MethodResourceDescription::new(cpus)),
        "local",
    );
    (runtime, adapter)
}

fn register_app(runtime: &Runtime) -> u64 {
    runtime.register_application(
        None,
        "integration",
        Box::new(DoNothingTaskMonitor),
        Arc::new(DoNothingApplicationRunner),
    )
}

/// Counter core element: writes (last value + 1) into every output.
fn register_counter(adapter: &Arc<LocalAdapter>, signature: &str) {
    let store = adapter.clone();
    adapter.register_core_element(signature, move |job| {
        let mut outputs = HashMap::new();
        for param in job.params.iter() {
            let previous = param
                .read
                .as_ref()
                .and_then(|r| store.stored_value(r))
                .and_then(|bytes| bytes.first().cloned())
                .unwrap_or(0);
            if let Some(ref write) = param.write {
                outputs.insert(write.clone(), vec![previous + 1]);
            }
        }
        LocalOutcome::Success { outputs }
    });
}

fn increment_spec(data: &DataDescription) -> TaskSpec {
    TaskSpec::new(0, "inc", vec![ImplementationSpec::method(0, "inc", 1)])
        .with_param(ParamSpec::dependency(AccessMode::RW, data.clone()))
}

#[test]
fn chained_increments_serialize() {
    let (runtime, adapter) = start(RuntimeConfig::default(), 2);
    register_counter(&adapter, "inc");
    let app = register_app(&runtime);

    let counter = DataDescription::File {
        location: "/tmp/nimbus-test-counter".to_string(),
    };
    for _ in 0..20 {
        runtime.submit_task(app, increment_spec(&counter));
    }
    runtime.barrier(app).unwrap();

    match runtime.access_data(app, AccessMode::R, counter.clone()) {
        AccessResult::Ready(access) => {
            let renaming = access.read_instance().unwrap().get_renaming();
            let value = adapter
                .stored_value(&renaming)
                .and_then(|bytes| bytes.first().cloned());
            assert_eq!(value, Some(20));
            runtime.finish_access(app, AccessMode::R, counter.clone(), None);
        }
        other => panic!("unexpected access outcome {:?}", other),
    }

    assert_eq!(runtime.shutdown(), 0);
}

#[test]
fn barrier_returns_after_every_task() {
    let (runtime, adapter) = start(RuntimeConfig::default(), 4);
    let finished = Arc::new(AtomicUsize::new(0));
    {
        let finished = finished.clone();
        adapter.register_core_element("tick", move |_job| {
            std::thread::sleep(Duration::from_millis(2));
            finished.fetch_add(1, Ordering::SeqCst);
            LocalOutcome::Success {
                outputs: HashMap::new(),
            }
        });
    }
    let app = register_app(&runtime);

    for i in 0..100 {
        let data = DataDescription::Object { code: i };
        let spec = TaskSpec::new(0, "tick", vec![ImplementationSpec::method(0, "tick", 1)])
            .with_param(ParamSpec::dependency(AccessMode::W, data));
        runtime.submit_task(app, spec);
    }
    runtime.barrier(app).unwrap();
    // Every task reached a terminal state before the barrier released
    assert_eq!(finished.load(Ordering::SeqCst), 100);
    assert_eq!(runtime.shutdown(), 0);
}

#[test]
fn throttle_bounds_live_tasks() {
    let mut cfg = RuntimeConfig::default();
    cfg.throttle_max_tasks = Some(2);
    let (runtime, adapter) = start(cfg, 8);

    let live = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    {
        let live = live.clone();
        let peak = peak.clone();
        adapter.register_core_element("slow", move |_job| {
            let now = live.fetch_add(1, Ordering::SeqCst) + 1;
            let mut seen = peak.load(Ordering::SeqCst);
            while now > seen {
                match peak.compare_exchange(seen, now, Ordering::SeqCst, Ordering::SeqCst) {
                    Ok(_) => break,
                    Err(actual) => seen = actual,
                }
            }
            std::thread::sleep(Duration::from_millis(15));
            live.fetch_sub(1, Ordering::SeqCst);
            LocalOutcome::Success {
                outputs: HashMap::new(),
            }
        });
    }
    let app = register_app(&runtime);

    for i in 0..8 {
        let data = DataDescription::Object { code: i };
        let spec = TaskSpec::new(0, "slow", vec![ImplementationSpec::method(0, "slow", 1)])
            .with_param(ParamSpec::dependency(AccessMode::W, data));
        runtime.submit_task(app, spec);
    }
    runtime.barrier(app).unwrap();

    // At most two tasks were ever live at once
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(runtime.shutdown(), 0);
}

#[test]
fn result_files_are_fetched_back() {
    let dir = tempdir::TempDir::new("nimbus-results").unwrap();
    let mut cfg = RuntimeConfig::default();
    cfg.app_log_dir = Some(dir.path().to_path_buf());
    let (runtime, adapter) = start(cfg, 2);
    register_counter(&adapter, "inc");
    let app = register_app(&runtime);

    let output = DataDescription::File {
        location: "/tmp/nimbus-test-output".to_string(),
    };
    runtime.submit_task(app, increment_spec(&output));
    runtime.submit_task(app, increment_spec(&output));

    let results = runtime.get_result_files(app);
    assert_eq!(results.len(), 1);
    let fetched = results[0].path.as_ref().expect("result file not fetched");
    let bytes = std::fs::read(fetched).unwrap();
    assert_eq!(bytes, vec![2]);
    assert_eq!(runtime.shutdown(), 0);
}

#[test]
fn profile_roundtrip_preserves_aggregates() {
    let dir = tempdir::TempDir::new("nimbus-profile").unwrap();
    let profile_path = dir.path().join("profile.json");

    {
        let mut cfg = RuntimeConfig::default();
        cfg.output_profile = Some(profile_path.clone());
        let (runtime, adapter) = start(cfg, 2);
        register_counter(&adapter, "inc");
        let app = register_app(&runtime);
        let data = DataDescription::File {
            location: "/tmp/nimbus-profiled".to_string(),
        };
        for _ in 0..5 {
            runtime.submit_task(app, increment_spec(&data));
        }
        runtime.barrier(app).unwrap();
        assert_eq!(runtime.shutdown(), 0);
    }

    let first: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&profile_path).unwrap()).unwrap();
    assert_eq!(first["implementations"]["inc"]["executions"], 5);
    assert!(first["resources"]["w0"]["implementations"]["inc"]["executions"] == 5);

    // A second runtime loads the profile and dumps it unchanged
    let second_path = dir.path().join("profile2.json");
    {
        let mut cfg = RuntimeConfig::default();
        cfg.input_profile = Some(profile_path.clone());
        cfg.output_profile = Some(second_path.clone());
        let (runtime, _adapter) = start(cfg, 2);
        let app = register_app(&runtime);
        runtime.barrier(app).unwrap();
        assert_eq!(runtime.shutdown(), 0);
    }
    let second: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&second_path).unwrap()).unwrap();
    assert_eq!(first["implementations"], second["implementations"]);
    assert_eq!(
        first["resources"]["w0"]["implementations"],
        second["resources"]["w0"]["implementations"]
    );
}

#[test]
fn cloud_workers_profile_under_the_cloud_section() {
    let dir = tempdir::TempDir::new("nimbus-cloud-profile").unwrap();
    let profile_path = dir.path().join("profile.json");

    let mut cfg = RuntimeConfig::default();
    cfg.output_profile = Some(profile_path.clone());
    let (runtime, adapter) = local_runtime(cfg, 2);
    runtime.add_cloud_worker(
        "c0",
        WorkerDescription::Method(MethodResourceDescription::new(2)),
        "local",
        "stub",
        "large",
    );
    register_counter(&adapter, "inc");
    let app = register_app(&runtime);
    let data = DataDescription::File {
        location: "/tmp/nimbus-cloud-counter".to_string(),
    };
    for _ in 0..3 {
        runtime.submit_task(app, increment_spec(&data));
    }
    runtime.barrier(app).unwrap();
    assert_eq!(runtime.shutdown(), 0);

    let profile: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&profile_path).unwrap()).unwrap();
    assert_eq!(profile["cloud"]["stub"]["large"]["inc"]["executions"], 3);
    // Elastic workers do not pollute the static resources section
    assert!(profile["resources"]["c0"].is_null());
}
