use std::collections::HashMap;

use types::UserAttrs;

/// Status a job (one execution attempt) ends with on its worker.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum JobEndStatus {
    Ok,
    TransfersFailed,
    SubmissionFailed,
    ExecutionFailed,
}

impl JobEndStatus {
    #[inline]
    pub fn is_ok(&self) -> bool {
        *self == JobEndStatus::Ok
    }
}

/// Runtime information collected for a task while and after it runs.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TaskInfo {
    #[serde(skip_serializing_if = "String::is_empty")]
    #[serde(default)]
    pub error: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    #[serde(default)]
    pub debug: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    #[serde(default)]
    pub worker: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    #[serde(default)]
    pub start_time: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub duration: Option<f64>,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    #[serde(default)]
    pub user: UserAttrs,
}
