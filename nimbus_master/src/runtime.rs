use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use futures::sync::mpsc::{unbounded, UnboundedSender};
use futures::sync::oneshot;
use futures::Future;

use nimbus_core::errors::{ErrorKind, Result};
use nimbus_core::logging::{Logger, MemoryLogger, SQLiteLogger};
use nimbus_core::types::{AccessMode, AppId, DataDescription, DataId, DataInstanceId, TaskId,
                         TaskSpec, WorkerDescription};
use nimbus_core::utils::{Semaphore, DEBUG_CHECK_CONSISTENCY};

use ap::{run_access_processor, AccessReply, ApRequest};
use checkpoint::CheckpointManager;
use config::RuntimeConfig;
use data::access::EngineDataAccessId;
use data::params::AccessParams;
use error_manager::ErrorManager;
use graph::app::TaskMonitor;
use graph::group::BarrierReply;
use jobs::CommAdapter;
use profile::ProfileStore;
use td::{Dispatcher, TdEvent};
use td::scheduler::TaskScheduler;

pub use graph::app::DoNothingTaskMonitor;

/// Element running the main code of an application. The runtime calls
/// `stalled_application` when the main thread is about to block on a
/// producer, and `ready_to_continue` once the value is available again.
#[allow(unused_variables)]
pub trait ApplicationRunner: Send + Sync {
    fn stalled_application(&self) {}
    fn ready_to_continue(&self) {}
}

pub struct DoNothingApplicationRunner;

impl ApplicationRunner for DoNothingApplicationRunner {}

/// Outcome of a main-code data access.
#[derive(Debug)]
pub enum AccessResult {
    /// The runtime never saw a value for the data.
    Unaware,
    /// The producing accesses were cancelled; there is nothing to read.
    Cancelled,
    Ready(EngineDataAccessId),
}

/// A file written by the application, fetched back at end of run.
pub struct ResultFile {
    pub data_id: DataId,
    pub instance: DataInstanceId,
    /// Local path of the fetched copy, when a transfer succeeded.
    pub path: Option<PathBuf>,
}

/// The runtime core: owns the access-processor and dispatcher threads, the
/// application registry and the adapter set. A process may host several
/// runtimes; nothing here is process-global.
pub struct Runtime {
    cfg: RuntimeConfig,
    ap: UnboundedSender<ApRequest>,
    td: UnboundedSender<TdEvent>,
    throttle: Semaphore,
    error: ErrorManager,
    next_task_id: AtomicUsize,
    runners: Mutex<HashMap<AppId, Arc<ApplicationRunner>>>,
    adapters: HashMap<String, Arc<CommAdapter>>,
    ap_thread: Option<JoinHandle<()>>,
    td_thread: Option<JoinHandle<()>>,
}

impl Runtime {
    pub fn new(
        cfg: RuntimeConfig,
        policy: Box<TaskScheduler>,
        adapters: HashMap<String, Arc<CommAdapter>>,
        checkpoint: Box<CheckpointManager>,
    ) -> Runtime {
        info!("Starting Nimbus {} master runtime", ::VERSION);
        if cfg.debug_mode {
            DEBUG_CHECK_CONSISTENCY.store(true, Ordering::Relaxed);
            info!("DEBUG mode enabled");
        }
        if cfg.disable_custom_threads_tracing {
            info!("Tracing of runtime-managed threads disabled");
        }

        let error = ErrorManager::new();
        let throttle = Semaphore::new(cfg.throttle_max_tasks);

        let (ap_sender, ap_receiver) = unbounded();
        let (td_sender, td_receiver) = unbounded();

        for adapter in adapters.values() {
            adapter.attach(td_sender.clone());
        }

        let logger: Box<Logger + Send> = match cfg.app_log_dir {
            Some(ref dir) => {
                if let Err(e) = ::std::fs::create_dir_all(dir) {
                    warn!("Cannot create log directory {:?}: {}", dir, e);
                }
                match SQLiteLogger::new(dir) {
                    Ok(logger) => Box::new(logger),
                    Err(e) => {
                        warn!("Cannot open event log in {:?}: {}", dir, e);
                        Box::new(MemoryLogger::new())
                    }
                }
            }
            None => Box::new(MemoryLogger::new()),
        };

        let ap_thread = {
            let td = td_sender.clone();
            let self_sender = ap_sender.clone();
            let error = error.clone();
            let throttle = throttle.clone();
            ::std::thread::Builder::new()
                .name("nimbus-ap".to_string())
                .spawn(move || {
                    run_access_processor(
                        ap_receiver,
                        td,
                        self_sender,
                        checkpoint,
                        logger,
                        error,
                        throttle,
                    )
                })
                .expect("cannot spawn the access processor")
        };

        let td_thread = {
            let profile = match cfg.input_profile {
                Some(ref path) => {
                    debug!("Input profile detected. Reading from file {:?}", path);
                    ProfileStore::load(path)
                }
                None => ProfileStore::new(),
            };
            let output_profile = cfg.output_profile.clone();
            let adapters = adapters.clone();
            let ap = ap_sender.clone();
            let error = error.clone();
            ::std::thread::Builder::new()
                .name("nimbus-td".to_string())
                .spawn(move || {
                    let dispatcher =
                        Dispatcher::new(policy, profile, output_profile, adapters, ap, error);
                    dispatcher.run(td_receiver);
                })
                .expect("cannot spawn the task dispatcher")
        };

        Runtime {
            cfg,
            ap: ap_sender,
            td: td_sender,
            throttle,
            error,
            next_task_id: AtomicUsize::new(1),
            runners: Mutex::new(HashMap::new()),
            adapters,
            ap_thread: Some(ap_thread),
            td_thread: Some(td_thread),
        }
    }

    /*
     * ------------------------------ APPLICATIONS ------------------------------
     */

    /// Registers an application, drawing a fresh random id when none is
    /// requested.
    pub fn register_application(
        &self,
        requested: Option<AppId>,
        parallelism_source: &str,
        monitor: Box<TaskMonitor>,
        runner: Arc<ApplicationRunner>,
    ) -> AppId {
        let mut runners = self.runners.lock().unwrap();
        let app_id = match requested {
            Some(id) => id,
            None => loop {
                let id = ::rand::random::<AppId>();
                if !runners.contains_key(&id) {
                    break id;
                }
            },
        };
        runners.insert(app_id, runner);
        let _ = self.ap.unbounded_send(ApRequest::RegisterApplication {
            app: app_id,
            parallelism_source: parallelism_source.to_string(),
            monitor,
            wall_clock_limit: self.cfg.wall_clock_limit,
        });
        app_id
    }

    pub fn open_task_group(&self, app: AppId, name: &str) {
        let _ = self.ap.unbounded_send(ApRequest::OpenTaskGroup {
            app,
            name: name.to_string(),
        });
    }

    pub fn close_current_task_group(&self, app: AppId) {
        let _ = self.ap.unbounded_send(ApRequest::CloseTaskGroup { app });
    }

    pub fn set_wall_clock_limit(&self, app: AppId, limit: Duration) {
        let _ = self.ap
            .unbounded_send(ApRequest::SetWallClockLimit { app, limit });
    }

    pub fn cancel_application_tasks(&self, app: AppId) {
        let (sx, rx) = oneshot::channel();
        let _ = self.ap.unbounded_send(ApRequest::CancelApplicationTasks {
            app,
            reply: Some(sx),
        });
        let _ = rx.wait();
    }

    /*
     * ------------------------------ WORKERS ------------------------------
     */

    pub fn add_worker(&self, name: &str, description: WorkerDescription, adapter: &str) {
        let _ = self.td.unbounded_send(TdEvent::AddWorker {
            name: name.to_string(),
            description,
            adapter: adapter.to_string(),
            cloud: None,
        });
        let _ = self.ap.unbounded_send(ApRequest::WorkerAdded {
            name: name.to_string(),
        });
    }

    /// Registers an elastic worker; its execution profile aggregates under
    /// the profile's cloud section.
    pub fn add_cloud_worker(
        &self,
        name: &str,
        description: WorkerDescription,
        adapter: &str,
        provider: &str,
        instance_type: &str,
    ) {
        let _ = self.td.unbounded_send(TdEvent::AddWorker {
            name: name.to_string(),
            description,
            adapter: adapter.to_string(),
            cloud: Some((provider.to_string(), instance_type.to_string())),
        });
        let _ = self.ap.unbounded_send(ApRequest::WorkerAdded {
            name: name.to_string(),
        });
    }

    /*
     * ------------------------------ TASKS ------------------------------
     */

    /// Submits a task. Blocks while the throttle is out of permits: at most
    /// `NIMBUS_THROTTLE_MAX_TASKS` tasks may be live at once.
    pub fn submit_task(&self, app: AppId, spec: TaskSpec) -> TaskId {
        self.throttle.acquire();
        let task_id = self.next_task_id.fetch_add(1, Ordering::SeqCst) as TaskId;
        let _ = self.ap.unbounded_send(ApRequest::TaskSubmit {
            app,
            task_id,
            spec,
        });
        task_id
    }

    /*
     * ------------------------------ DATA ------------------------------
     */

    /// Declares a main-code access and blocks until the value is available.
    /// While parked on a producer the application runner is stalled and
    /// resumed around the wait.
    pub fn access_data(&self, app: AppId, mode: AccessMode, data: DataDescription) -> AccessResult {
        let (sx, rx) = oneshot::channel();
        let _ = self.ap.unbounded_send(ApRequest::RegisterDataAccess {
            access: AccessParams::main_access(app, mode, data),
            reply: sx,
        });
        match rx.wait() {
            Ok(AccessReply::Unaware) | Err(_) => AccessResult::Unaware,
            Ok(AccessReply::Cancelled) => AccessResult::Cancelled,
            Ok(AccessReply::Ready { access }) => AccessResult::Ready(access),
            Ok(AccessReply::MustWait { wait }) => {
                let runner = self.runners.lock().unwrap().get(&app).cloned();
                if let Some(ref runner) = runner {
                    runner.stalled_application();
                }
                let access = wait.wait();
                if let Some(ref runner) = runner {
                    runner.ready_to_continue();
                }
                match access {
                    Ok(access) => AccessResult::Ready(access),
                    Err(_) => AccessResult::Cancelled,
                }
            }
        }
    }

    /// Marks a main-code access as finished, optionally naming the instance
    /// the main code produced.
    pub fn finish_access(
        &self,
        app: AppId,
        mode: AccessMode,
        data: DataDescription,
        produced: Option<DataInstanceId>,
    ) {
        let _ = self.ap.unbounded_send(ApRequest::FinishDataAccess {
            access: AccessParams::main_access(app, mode, data),
            produced,
        });
    }

    /// Signals that the data is no longer needed. Returns whether the
    /// runtime knew the value.
    pub fn delete_data(&self, app: AppId, data: DataDescription) -> bool {
        let (sx, rx) = oneshot::channel();
        let _ = self.ap.unbounded_send(ApRequest::DeleteData {
            app,
            data,
            reply: sx,
        });
        rx.wait().unwrap_or(false)
    }

    pub fn get_last_data_version(
        &self,
        app: AppId,
        data: DataDescription,
    ) -> Option<DataInstanceId> {
        let (sx, rx) = oneshot::channel();
        let _ = self.ap.unbounded_send(ApRequest::DataGetLastVersion {
            app,
            data,
            reply: sx,
        });
        rx.wait().unwrap_or(None)
    }

    /// Binds a value produced outside the runtime to the data.
    pub fn register_remote_data(&self, app: AppId, data: DataDescription, source: &str) {
        let _ = self.ap.unbounded_send(ApRequest::RegisterRemoteData {
            app,
            data,
            source: source.to_string(),
        });
    }

    /*
     * ------------------------------ BARRIERS ------------------------------
     */

    /// Blocks until every task submitted so far by the application reached
    /// a terminal state.
    pub fn barrier(&self, app: AppId) -> Result<()> {
        let (sx, rx) = oneshot::channel();
        let _ = self.ap.unbounded_send(ApRequest::Barrier { app, reply: sx });
        self.wait_barrier(rx)
    }

    /// Blocks until every task of the named group terminated; surfaces the
    /// group exception when one was raised.
    pub fn barrier_group(&self, app: AppId, group: &str) -> Result<()> {
        let (sx, rx) = oneshot::channel();
        let _ = self.ap.unbounded_send(ApRequest::BarrierGroup {
            app,
            group: group.to_string(),
            reply: sx,
        });
        self.wait_barrier(rx)
    }

    fn wait_barrier(&self, rx: oneshot::Receiver<BarrierReply>) -> Result<()> {
        match rx.wait() {
            Ok(BarrierReply::Released) | Err(_) => Ok(()),
            Ok(BarrierReply::Exception(e)) => Err(ErrorKind::GroupException(e).into()),
            Ok(BarrierReply::UnknownGroup) => {
                Err(ErrorKind::UnknownGroup("barrier".to_string()).into())
            }
        }
    }

    /*
     * ------------------------------ RESULTS & SHUTDOWN ------------------------------
     */

    /// Waits for the application to drain, then fetches every file it wrote
    /// into the application artifact directory.
    pub fn get_result_files(&self, app: AppId) -> Vec<ResultFile> {
        let _ = self.barrier(app);
        let (sx, rx) = oneshot::channel();
        let _ = self.ap
            .unbounded_send(ApRequest::GetResultFiles { app, reply: sx });
        let entries = rx.wait().unwrap_or_else(|_| Vec::new());

        let dest_dir = self.cfg
            .app_log_dir
            .clone()
            .unwrap_or_else(::std::env::temp_dir)
            .join(format!("app-{}", app));
        if let Err(e) = ::std::fs::create_dir_all(&dest_dir) {
            warn!("Cannot create result directory {:?}: {}", dest_dir, e);
        }

        entries
            .into_iter()
            .map(|entry| {
                let renaming = entry.instance.get_renaming();
                let destination = dest_dir.join(&renaming);
                let path = self.fetch_renaming(&renaming, &destination);
                ResultFile {
                    data_id: entry.data_id,
                    instance: entry.instance,
                    path,
                }
            })
            .collect()
    }

    fn fetch_renaming(&self, renaming: &str, destination: &PathBuf) -> Option<PathBuf> {
        for adapter in self.adapters.values() {
            if !adapter.exists_data(renaming) {
                continue;
            }
            let (sx, rx) = ::std::sync::mpsc::channel();
            adapter.get_data(renaming, destination, sx);
            match rx.recv() {
                Ok(Ok(())) => return Some(destination.clone()),
                Ok(Err(e)) => {
                    self.error
                        .warn(&format!("Fetching {} failed: {}", renaming, e));
                    return None;
                }
                Err(_) => return None,
            }
        }
        debug!("Renaming {} exists on no adapter", renaming);
        None
    }

    #[inline]
    pub fn fatal_reached(&self) -> bool {
        self.error.fatal_reached()
    }

    /// Exit code a driver should surface: nonzero after a fatal condition.
    pub fn exit_code(&self) -> i32 {
        if self.fatal_reached() {
            1
        } else {
            0
        }
    }

    /// Stops both loops and waits for them. Callers are expected to drain
    /// their applications (barrier) first; in-flight work is dropped.
    pub fn shutdown(mut self) -> i32 {
        info!("Shutting down the runtime");
        {
            let (sx, rx) = oneshot::channel();
            let _ = self.ap.unbounded_send(ApRequest::Shutdown { reply: sx });
            let _ = rx.wait();
        }
        {
            let (sx, rx) = oneshot::channel();
            let _ = self.td.unbounded_send(TdEvent::Shutdown { reply: sx });
            let _ = rx.wait();
        }
        if let Some(handle) = self.ap_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.td_thread.take() {
            let _ = handle.join();
        }
        self.exit_code()
    }
}

/// Shorthand wiring an `OrderStrict` runtime over a single local adapter;
/// the configuration used by the driver and the test suite.
pub fn local_runtime(cfg: RuntimeConfig, threads: usize) -> (Runtime, Arc<::jobs::LocalAdapter>) {
    let adapter = Arc::new(::jobs::LocalAdapter::new(threads));
    let mut adapters: HashMap<String, Arc<CommAdapter>> = HashMap::new();
    adapters.insert("local".to_string(), adapter.clone());
    let runtime = Runtime::new(
        cfg,
        Box::new(::td::OrderStrictScheduler::new()),
        adapters,
        Box::new(::checkpoint::NoCheckpoint),
    );
    (runtime, adapter)
}
