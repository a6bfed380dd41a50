#![allow(renamed_and_removed_lints)]

use std::fmt;

use types::{AppId, TaskId};

// Create the Error, ErrorKind, ResultExt, and Result types
error_chain! {
    types {
        Error, ErrorKind, ResultExt;
    }
    foreign_links {
        Io(::std::io::Error);
        Json(::serde_json::Error);
        Sqlite(::rusqlite::Error);
        Utf8Err(::std::str::Utf8Error);
        ParseInt(::std::num::ParseIntError);
    }

    errors {
        Blocked {
            description("no resource can ever host the action")
        }
        UnknownData(data_id: i32) {
            description("data is not registered")
            display("data {} is not registered", data_id)
        }
        UnknownTask(task_id: i32) {
            description("task is not registered")
            display("task {} is not registered", task_id)
        }
        UnknownGroup(name: String) {
            description("task group is not registered")
            display("task group {:?} is not registered", name)
        }
        UnknownWorker(name: String) {
            description("worker is not registered")
            display("worker {:?} is not registered", name)
        }
        GroupException(e: TaskException) {
            description("task group raised an exception")
            display("task group raised: {}", e)
        }
    }
}

// Explicit alias just to make the IDEs happier
pub type Result<T> = ::std::result::Result<T, Error>;

/// Application-level exception thrown inside a task. It is a status signal
/// that propagates to the enclosing task group, not a runtime failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskException {
    message: String,
    task_id: TaskId,
    app_id: AppId,
}

impl TaskException {
    pub fn new(message: String, task_id: TaskId, app_id: AppId) -> Self {
        TaskException {
            message,
            task_id,
            app_id,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }
}

impl fmt::Display for TaskException {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TaskException({:?} from task {})", self.message, self.task_id)
    }
}
