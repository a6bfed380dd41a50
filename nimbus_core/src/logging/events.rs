use types::{AppId, DataInstanceId, JobEndStatus, TaskId, TaskInfo, WorkerId};

pub type EventId = i64;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerNewEvent {
    pub worker: WorkerId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerRemovedEvent {
    pub worker: WorkerId,
    pub error_msg: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApplicationNewEvent {
    pub app: AppId,
    pub parallelism_source: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ApplicationClosedReason {
    /// The main code finished and the application was deregistered
    MainClose,
    /// The wall clock limit expired and the application was cancelled
    WallClockLimit,
    /// The error manager brought the runtime down
    Fatal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApplicationClosedEvent {
    pub app: AppId,
    pub reason: ApplicationClosedReason,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskSubmittedEvent {
    pub app: AppId,
    pub task: TaskId,
    pub label: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskStartedEvent {
    pub app: AppId,
    pub task: TaskId,
    pub worker: WorkerId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskFinishedEvent {
    pub app: AppId,
    pub task: TaskId,
    pub info: TaskInfo,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskFailedEvent {
    pub app: AppId,
    pub task: TaskId,
    pub status: JobEndStatus,
    pub error_msg: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskCanceledEvent {
    pub app: AppId,
    pub task: TaskId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupExceptionEvent {
    pub app: AppId,
    pub group: String,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataRemovedEvent {
    pub instance: DataInstanceId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BarrierReachedEvent {
    pub app: AppId,
    pub group: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    WorkerNew(WorkerNewEvent),
    WorkerRemoved(WorkerRemovedEvent),

    ApplicationNew(ApplicationNewEvent),
    ApplicationClosed(ApplicationClosedEvent),

    TaskSubmitted(TaskSubmittedEvent),
    TaskStarted(TaskStartedEvent),
    TaskFinished(TaskFinishedEvent),
    TaskFailed(TaskFailedEvent),
    TaskCanceled(TaskCanceledEvent),

    GroupException(GroupExceptionEvent),

    DataRemoved(DataRemovedEvent),
    BarrierReached(BarrierReachedEvent),

    Dummy(i32),
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            &Event::WorkerNew(_) => "WorkerNew",
            &Event::WorkerRemoved(_) => "WorkerRemoved",
            &Event::ApplicationNew(_) => "ApplicationNew",
            &Event::ApplicationClosed(_) => "ApplicationClosed",
            &Event::TaskSubmitted(_) => "TaskSubmitted",
            &Event::TaskStarted(_) => "TaskStarted",
            &Event::TaskFinished(_) => "TaskFinished",
            &Event::TaskFailed(_) => "TaskFailed",
            &Event::TaskCanceled(_) => "TaskCanceled",
            &Event::GroupException(_) => "GroupException",
            &Event::DataRemoved(_) => "DataRemoved",
            &Event::BarrierReached(_) => "BarrierReached",
            &Event::Dummy(_) => "Dummy",
        }
    }

    pub fn app_id(&self) -> Option<AppId> {
        match self {
            &Event::ApplicationNew(ref e) => Some(e.app),
            &Event::ApplicationClosed(ref e) => Some(e.app),
            &Event::TaskSubmitted(ref e) => Some(e.app),
            &Event::TaskStarted(ref e) => Some(e.app),
            &Event::TaskFinished(ref e) => Some(e.app),
            &Event::TaskFailed(ref e) => Some(e.app),
            &Event::TaskCanceled(ref e) => Some(e.app),
            &Event::GroupException(ref e) => Some(e.app),
            &Event::BarrierReached(ref e) => Some(e.app),
            _ => None,
        }
    }
}
