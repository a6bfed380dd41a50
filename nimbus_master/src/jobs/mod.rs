pub mod adapter;
pub mod local;

use std::fmt;

use nimbus_core::types::{AccessMode, AppId, ImplementationSpec, JobId, TaskId, WorkerId};

pub use self::adapter::CommAdapter;
pub use self::local::{LocalAdapter, LocalOutcome};

/// Submission attempts for one task before its failure policy takes over.
pub const MAX_JOB_RETRIES: u32 = 3;

/// One task parameter as shipped to a worker: the renamings its access
/// reads and produces.
#[derive(Clone, Debug)]
pub struct JobParam {
    pub name: String,
    pub mode: AccessMode,
    pub read: Option<String>,
    pub write: Option<String>,
}

/// Everything an adapter needs to run a task on a worker. Plain data; it
/// crosses into the adapter pool threads.
#[derive(Clone, Debug)]
pub struct JobDescription {
    pub job_id: JobId,
    pub task_id: TaskId,
    pub app: AppId,
    pub label: String,
    pub implementation: ImplementationSpec,
    pub worker: WorkerId,
    pub params: Vec<JobParam>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JobState {
    Submitted,
    Completed,
    Failed,
    Cancelled,
}

/// One execution attempt of a task on a chosen worker.
pub struct Job {
    pub(crate) description: JobDescription,
    pub(crate) state: JobState,
    pub(crate) being_cancelled: bool,
}

wrapped_ref!(JobRef, Job);

impl Job {
    #[inline]
    pub fn get_id(&self) -> JobId {
        self.description.job_id
    }

    #[inline]
    pub fn get_task_id(&self) -> TaskId {
        self.description.task_id
    }

    #[inline]
    pub fn get_worker(&self) -> &str {
        &self.description.worker
    }
}

impl JobRef {
    pub fn new(description: JobDescription) -> Self {
        JobRef::wrap(Job {
            description,
            state: JobState::Submitted,
            being_cancelled: false,
        })
    }
}

impl fmt::Debug for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.get();
        write!(
            f,
            "JobRef {} (task {} on {})",
            inner.description.job_id, inner.description.task_id, inner.description.worker
        )
    }
}
