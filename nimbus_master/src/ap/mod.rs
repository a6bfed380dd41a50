pub mod analyser;

use std::collections::HashMap;
use std::time::Duration;

use futures::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use futures::sync::oneshot;
use futures::Stream;
use tokio_core::reactor::Handle;

use nimbus_core::errors::Result;
use nimbus_core::logging::Logger;
use nimbus_core::types::{AppId, DataDescription, DataId, DataInstanceId, JobEndStatus,
                         TaskEndStatus, TaskId, TaskSpec, WorkerId};
use nimbus_core::utils::{ConsistencyCheck, Semaphore};

use checkpoint::CheckpointManager;
use comm::TransferLedger;
use data::access::EngineDataAccessId;
use data::info::DataInfoRef;
use data::params::AccessParams;
use error_manager::ErrorManager;
use graph::app::{ApplicationRef, TaskMonitor};
use graph::group::BarrierWaiter;
use graph::task::{TaskNodeRef, WaiterId};
use td::TdEvent;

/// Outcome of registering a main-code data access.
pub enum AccessReply {
    /// The runtime never saw a value for the data.
    Unaware,
    /// The producing accesses were cancelled and no version remains.
    Cancelled,
    Ready {
        access: EngineDataAccessId,
    },
    /// A producer is still running; the final access arrives on the
    /// embedded channel once every producer committed.
    MustWait {
        wait: oneshot::Receiver<EngineDataAccessId>,
    },
}

/// Terminal report of one task, posted by the dispatcher.
pub struct TaskEndInfo {
    pub status: TaskEndStatus,
    /// Application-level exception raised inside the task.
    pub exception: Option<String>,
    /// Renamings produced by the execution and where they landed.
    pub locations: Vec<(String, WorkerId)>,
    pub worker: Option<WorkerId>,
    pub duration_ms: Option<f64>,
    pub job_status: Option<JobEndStatus>,
    /// The task never found a compatible resource; fatal for the task only.
    pub blocked: bool,
}

/// One written file of an application, reported at end of run.
pub struct ResultFileEntry {
    pub data_id: DataId,
    pub instance: DataInstanceId,
    pub locations: Vec<WorkerId>,
}

/// Requests serialized through the access-processor queue. Every mutation
/// of analysis state is one of these.
pub enum ApRequest {
    RegisterApplication {
        app: AppId,
        parallelism_source: String,
        monitor: Box<TaskMonitor>,
        wall_clock_limit: Option<Duration>,
    },
    OpenTaskGroup {
        app: AppId,
        name: String,
    },
    CloseTaskGroup {
        app: AppId,
    },
    TaskSubmit {
        app: AppId,
        task_id: TaskId,
        spec: TaskSpec,
    },
    /// A job for the task started running on a worker.
    TaskRunning {
        task_id: TaskId,
        worker: WorkerId,
    },
    TaskEnd {
        task_id: TaskId,
        info: TaskEndInfo,
    },
    RegisterDataAccess {
        access: AccessParams,
        reply: oneshot::Sender<AccessReply>,
    },
    FinishDataAccess {
        access: AccessParams,
        produced: Option<DataInstanceId>,
    },
    RegisterRemoteData {
        app: AppId,
        data: DataDescription,
        source: WorkerId,
    },
    DataGetLastVersion {
        app: AppId,
        data: DataDescription,
        reply: oneshot::Sender<Option<DataInstanceId>>,
    },
    DeleteData {
        app: AppId,
        data: DataDescription,
        reply: oneshot::Sender<bool>,
    },
    Barrier {
        app: AppId,
        reply: BarrierWaiter,
    },
    BarrierGroup {
        app: AppId,
        group: String,
        reply: BarrierWaiter,
    },
    GetResultFiles {
        app: AppId,
        reply: oneshot::Sender<Vec<ResultFileEntry>>,
    },
    SetWallClockLimit {
        app: AppId,
        limit: Duration,
    },
    CancelApplicationTasks {
        app: AppId,
        reply: Option<oneshot::Sender<()>>,
    },
    WorkerAdded {
        name: WorkerId,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// A parked main access: how many producers it still waits for and the
/// channel releasing the caller.
pub(crate) struct MainWaiter {
    pub pending: usize,
    pub sender: oneshot::Sender<EngineDataAccessId>,
    pub access: EngineDataAccessId,
}

/// The access processor: a single thread owning every piece of analysis
/// state. Requests are processed strictly in arrival order; no other thread
/// ever touches the graph, the data registry or the applications.
pub struct AccessProcessor {
    pub(crate) apps: HashMap<AppId, ApplicationRef>,
    pub(crate) tasks: HashMap<TaskId, TaskNodeRef>,
    pub(crate) data: HashMap<DataId, DataInfoRef>,
    pub(crate) waiters: HashMap<WaiterId, MainWaiter>,

    pub(crate) next_data_id: DataId,
    pub(crate) next_waiter_id: WaiterId,
    /// Synthetic nodes (commutative groups) draw ids from the top of the
    /// task id space.
    pub(crate) next_synthetic_task_id: TaskId,

    pub(crate) td: UnboundedSender<TdEvent>,
    pub(crate) self_sender: UnboundedSender<ApRequest>,
    pub(crate) handle: Handle,

    pub(crate) ledger: TransferLedger,
    pub(crate) checkpoint: Box<CheckpointManager>,
    pub(crate) logger: Box<Logger + Send>,
    pub(crate) error: ErrorManager,
    pub(crate) throttle: Semaphore,
}

impl AccessProcessor {
    pub fn new(
        td: UnboundedSender<TdEvent>,
        self_sender: UnboundedSender<ApRequest>,
        handle: Handle,
        checkpoint: Box<CheckpointManager>,
        logger: Box<Logger + Send>,
        error: ErrorManager,
        throttle: Semaphore,
    ) -> Self {
        info!("Access processor initialized");
        AccessProcessor {
            apps: HashMap::new(),
            tasks: HashMap::new(),
            data: HashMap::new(),
            waiters: HashMap::new(),
            next_data_id: 1,
            next_waiter_id: 1,
            next_synthetic_task_id: ::std::i32::MAX / 2,
            td,
            self_sender,
            handle,
            ledger: TransferLedger::new(),
            checkpoint,
            logger,
            error,
            throttle,
        }
    }

    /// Processes one request; false stops the loop.
    pub fn process(&mut self, request: ApRequest) -> bool {
        let keep_running = match request {
            ApRequest::RegisterApplication {
                app,
                parallelism_source,
                monitor,
                wall_clock_limit,
            } => {
                self.register_application(app, parallelism_source, monitor, wall_clock_limit);
                true
            }
            ApRequest::OpenTaskGroup { app, name } => {
                self.open_task_group(app, &name);
                true
            }
            ApRequest::CloseTaskGroup { app } => {
                self.close_task_group(app);
                true
            }
            ApRequest::TaskSubmit { app, task_id, spec } => {
                self.task_submit(app, task_id, spec);
                true
            }
            ApRequest::TaskRunning { task_id, worker } => {
                self.task_running(task_id, worker);
                true
            }
            ApRequest::TaskEnd { task_id, info } => {
                self.task_end(task_id, info);
                true
            }
            ApRequest::RegisterDataAccess { access, reply } => {
                self.register_data_access(access, reply);
                true
            }
            ApRequest::FinishDataAccess { access, produced } => {
                self.finish_data_access(access, produced);
                true
            }
            ApRequest::RegisterRemoteData { app, data, source } => {
                self.register_remote_data(app, data, source);
                true
            }
            ApRequest::DataGetLastVersion { app, data, reply } => {
                self.data_get_last_version(app, data, reply);
                true
            }
            ApRequest::DeleteData { app, data, reply } => {
                self.delete_data(app, data, reply);
                true
            }
            ApRequest::Barrier { app, reply } => {
                self.barrier(app, reply);
                true
            }
            ApRequest::BarrierGroup { app, group, reply } => {
                self.barrier_group(app, &group, reply);
                true
            }
            ApRequest::GetResultFiles { app, reply } => {
                self.get_result_files(app, reply);
                true
            }
            ApRequest::SetWallClockLimit { app, limit } => {
                self.set_wall_clock_limit(app, limit);
                true
            }
            ApRequest::CancelApplicationTasks { app, reply } => {
                self.cancel_application_tasks(app);
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
                true
            }
            ApRequest::WorkerAdded { name } => {
                self.logger.add_new_worker_event(name);
                true
            }
            ApRequest::Shutdown { reply } => {
                self.shutdown();
                let _ = reply.send(());
                false
            }
        };
        self.check_consistency_opt().unwrap(); // unrecoverable
        keep_running
    }
}

impl ConsistencyCheck for AccessProcessor {
    /// Check consistency of all tasks and data. Quite slow.
    fn check_consistency(&self) -> Result<()> {
        debug!("Checking analysis state consistency");
        for task in self.tasks.values() {
            task.check_consistency()?;
        }
        for data in self.data.values() {
            data.check_consistency()?;
        }
        Ok(())
    }
}

/// Entry point of the access-processor thread: builds the state and spins
/// on the request queue until shutdown.
pub fn run_access_processor(
    requests: UnboundedReceiver<ApRequest>,
    td: UnboundedSender<TdEvent>,
    self_sender: UnboundedSender<ApRequest>,
    checkpoint: Box<CheckpointManager>,
    logger: Box<Logger + Send>,
    error: ErrorManager,
    throttle: Semaphore,
) {
    let mut core = ::tokio_core::reactor::Core::new().unwrap();
    let handle = core.handle();
    let mut state = AccessProcessor::new(
        td,
        self_sender,
        handle,
        checkpoint,
        logger,
        error,
        throttle,
    );
    let future = requests.for_each(move |request| {
        if state.process(request) {
            Ok(())
        } else {
            Err(())
        }
    });
    // The error just signals the end of the loop
    let _ = core.run(future);
    debug!("Access processor loop finished");
}
