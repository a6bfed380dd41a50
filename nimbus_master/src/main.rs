extern crate atty;
#[macro_use]
extern crate clap;
extern crate env_logger;
#[macro_use]
extern crate log;

extern crate nimbus_core;
extern crate nimbus_master;

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::exit;

use clap::{App, Arg, ArgMatches, SubCommand};

use nimbus_core::types::{AccessMode, DataDescription, ImplementationSpec, ParamSpec, TaskSpec};
use nimbus_master::config::{default_log_directory, RuntimeConfig};
use nimbus_master::jobs::LocalOutcome;
use nimbus_master::runtime::{local_runtime, AccessResult, DoNothingApplicationRunner,
                             DoNothingTaskMonitor};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_log() {
    // Simple logger for better module log control, default level is INFO
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    if ::atty::is(::atty::Stream::Stdout) {
        ::env_logger::Builder::new()
            .format(|buf, record| {
                use env_logger::Color;
                use log::Level;

                let ts = buf.timestamp();
                let level = record.level();
                let mut level_style = buf.style();

                match level {
                    Level::Trace => level_style.set_color(Color::White),
                    Level::Debug => level_style.set_color(Color::Blue),
                    Level::Info => level_style.set_color(Color::Green),
                    Level::Warn => level_style.set_color(Color::Yellow),
                    Level::Error => level_style.set_color(Color::Red).set_bold(true),
                };
                writeln!(
                    buf,
                    "{:>5} {} {}",
                    level_style.value(level),
                    ts,
                    record.args()
                )
            })
            .parse(&::std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
            .init();
    } else {
        ::env_logger::init();
    }
}

fn run_master(_global_args: &ArgMatches, cmd_args: &ArgMatches) {
    let workers = value_t!(cmd_args, "WORKERS", u32).unwrap_or(1);
    let cpus = if cmd_args.value_of("CPUS") != Some("detect") {
        value_t_or_exit!(cmd_args, "CPUS", u32)
    } else {
        debug!("Detecting number of cpus");
        ::nimbus_master::num_cpus_detected()
    };
    let tasks = value_t!(cmd_args, "TASKS", u32).unwrap_or(10);

    let mut cfg = RuntimeConfig::from_env();
    if let Some(dir) = cmd_args.value_of("LOG_DIR") {
        cfg.app_log_dir = Some(PathBuf::from(dir));
    } else if cfg.app_log_dir.is_none() {
        cfg.app_log_dir = Some(default_log_directory("master"));
    }

    info!("Starting Nimbus {} master", VERSION);
    info!("Workers: {} with {} cpus each", workers, cpus);

    let (runtime, adapter) = local_runtime(cfg, 0);
    for i in 0..workers {
        runtime.add_worker(
            &format!("w{}", i),
            nimbus_core::types::WorkerDescription::Method(
                nimbus_core::types::MethodResourceDescription::new(cpus),
            ),
            "local",
        );
    }

    // Demo pipeline: a chain of counter increments over one file datum
    {
        let counting = adapter.clone();
        adapter.register_core_element("demo.inc", move |job| {
            let mut outputs = HashMap::new();
            for param in job.params.iter() {
                let previous = param
                    .read
                    .as_ref()
                    .and_then(|r| counting.stored_value(r))
                    .and_then(|bytes| bytes.first().cloned())
                    .unwrap_or(0);
                if let Some(ref write) = param.write {
                    outputs.insert(write.clone(), vec![previous + 1]);
                }
            }
            LocalOutcome::Success { outputs }
        });
    }

    let app = runtime.register_application(
        None,
        "demo",
        Box::new(DoNothingTaskMonitor),
        ::std::sync::Arc::new(DoNothingApplicationRunner),
    );

    let counter = DataDescription::File {
        location: "/tmp/nimbus-demo-counter".to_string(),
    };
    let implementations = vec![ImplementationSpec::method(0, "demo.inc", 1)];
    for _ in 0..tasks {
        let spec = TaskSpec::new(0, "demo.inc", implementations.clone())
            .with_param(ParamSpec::dependency(AccessMode::RW, counter.clone()));
        runtime.submit_task(app, spec);
    }

    if let Err(e) = runtime.barrier(app) {
        error!("Barrier failed: {}", e);
    }

    match runtime.access_data(app, AccessMode::R, counter.clone()) {
        AccessResult::Ready(access) => {
            let renaming = access.read_instance().unwrap().get_renaming();
            let value = adapter
                .stored_value(&renaming)
                .and_then(|bytes| bytes.first().cloned())
                .unwrap_or(0);
            info!("Counter reached {} after {} tasks", value, tasks);
            runtime.finish_access(app, AccessMode::R, counter.clone(), None);
        }
        other => warn!("Unexpected access outcome: {:?}", other),
    }

    let results = runtime.get_result_files(app);
    for file in results.iter() {
        info!(
            "Result file {} fetched to {:?}",
            file.instance.get_renaming(),
            file.path
        );
    }

    let code = runtime.shutdown();
    exit(code);
}

fn main() {
    init_log();

    let args = App::new("Nimbus")
        .version(VERSION)
        .about("Task-based dataflow runtime master")
        .subcommand(
            // ---- MASTER ----
            SubCommand::with_name("master")
                .about("Run the master with local in-process workers")
                .arg(
                    Arg::with_name("WORKERS")
                        .long("--workers")
                        .help("Number of local workers (default 1)")
                        .value_name("N")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("CPUS")
                        .long("--cpus")
                        .help("Cpus per worker or 'detect' (default = detect)")
                        .value_name("N")
                        .default_value("detect"),
                )
                .arg(
                    Arg::with_name("TASKS")
                        .long("--tasks")
                        .help("Length of the demo pipeline (default 10)")
                        .value_name("N")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("LOG_DIR")
                        .long("--logdir")
                        .help("Artifact directory (default /tmp/nimbus-logs/master-$PID)")
                        .takes_value(true),
                ),
        )
        .get_matches();

    match args.subcommand() {
        ("master", Some(cmd_args)) => run_master(&args, cmd_args),
        _ => {
            error!("No subcommand provided.");
            ::std::process::exit(1);
        }
    }
}
