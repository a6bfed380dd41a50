pub mod data;
pub mod id;
pub(crate) mod info;
pub(crate) mod resources;
pub(crate) mod spec;

pub type UserValue = ::serde_json::Value;
pub type UserAttrs = ::std::collections::HashMap<String, UserValue>;

pub use self::data::{AccessMode, DataDescription, DataKind, OnFailure, StdIo, TaskEndStatus,
                     TaskHistory, TaskState};
pub use self::id::{AppId, CoreId, DataId, DataInstanceId, ImplId, JobId, TaskId, VersionId,
                   WorkerId};
pub use self::info::{JobEndStatus, TaskInfo};
pub use self::resources::{HttpResourceDescription, ImplRequirements, MethodResourceDescription,
                          WorkerDescription};
pub use self::spec::{ImplKind, ImplementationSpec, ParamSpec, TaskSpec};
