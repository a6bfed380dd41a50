use std::fmt;

/// How a task or the main code accesses a datum.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    /// Read
    R,
    /// Write
    W,
    /// Read and write
    RW,
    /// Concurrent read (several tasks may hold the value at once)
    C,
    /// Commutative write (reorderable with other commutative writes)
    CV,
}

impl AccessMode {
    #[inline]
    pub fn is_read(&self) -> bool {
        match *self {
            AccessMode::R | AccessMode::RW | AccessMode::C | AccessMode::CV => true,
            AccessMode::W => false,
        }
    }

    #[inline]
    pub fn is_write(&self) -> bool {
        match *self {
            AccessMode::W | AccessMode::RW | AccessMode::CV => true,
            AccessMode::R | AccessMode::C => false,
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            AccessMode::R => "R",
            AccessMode::W => "W",
            AccessMode::RW => "RW",
            AccessMode::C => "C",
            AccessMode::CV => "CV",
        };
        f.write_str(s)
    }
}

/// Standard I/O role of a parameter on the worker side.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum StdIo {
    Unspecified,
    Stdin,
    Stdout,
    Stderr,
}

impl Default for StdIo {
    fn default() -> Self {
        StdIo::Unspecified
    }
}

/// What the runtime does when a task execution fails.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum OnFailure {
    /// Resubmit up to a policy-defined bound, then escalate.
    Retry,
    /// Escalate to the error manager right away.
    Fail,
    /// Proceed, marking the outputs as unproduced.
    Ignore,
    /// Proceed, cancelling every successor of the task.
    CancelSuccessors,
}

impl Default for OnFailure {
    fn default() -> Self {
        OnFailure::Retry
    }
}

impl OnFailure {
    /// Policies that let the application continue with missing outputs.
    #[inline]
    pub fn produces_empty_results_on_failure(&self) -> bool {
        match *self {
            OnFailure::Ignore | OnFailure::CancelSuccessors => true,
            OnFailure::Retry | OnFailure::Fail => false,
        }
    }
}

/// Life cycle of a task on the master.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TaskState {
    Created,
    ToAnalyse,
    Analysed,
    ToExecute,
    Executing,
    Finished,
    Failed,
    Canceled,
}

impl TaskState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        match *self {
            TaskState::Finished | TaskState::Failed | TaskState::Canceled => true,
            _ => false,
        }
    }
}

/// Scheduling history of a task.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TaskHistory {
    New,
    Resubmitted,
    Rescheduled,
    Cancelled,
}

/// Terminal status reported when a task ends.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TaskEndStatus {
    Finished,
    Failed,
    Canceled,
}

/// The kinds of data the runtime versions.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum DataKind {
    File,
    Object,
    Collection,
    DictCollection,
    BindingObject,
    Stream,
}

/// Identity of a datum as declared by the application. Each kind knows the
/// key under which it registers on its owning application.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DataDescription {
    File { location: String },
    Object { code: i32 },
    Collection { id: String },
    DictCollection { id: String },
    BindingObject { code: i32, class: String },
    Stream { code: i32 },
}

impl DataDescription {
    pub fn kind(&self) -> DataKind {
        match *self {
            DataDescription::File { .. } => DataKind::File,
            DataDescription::Object { .. } => DataKind::Object,
            DataDescription::Collection { .. } => DataKind::Collection,
            DataDescription::DictCollection { .. } => DataKind::DictCollection,
            DataDescription::BindingObject { .. } => DataKind::BindingObject,
            DataDescription::Stream { .. } => DataKind::Stream,
        }
    }

    pub fn is_stream(&self) -> bool {
        match *self {
            DataDescription::Stream { .. } => true,
            _ => false,
        }
    }

    pub fn description(&self) -> String {
        match *self {
            DataDescription::File { ref location } => format!("file {}", location),
            DataDescription::Object { code } => format!("object #{}", code),
            DataDescription::Collection { ref id } => format!("collection {}", id),
            DataDescription::DictCollection { ref id } => format!("dict-collection {}", id),
            DataDescription::BindingObject { code, ref class } => {
                format!("binding object #{} ({})", code, class)
            }
            DataDescription::Stream { code } => format!("stream #{}", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_split() {
        assert!(AccessMode::R.is_read() && !AccessMode::R.is_write());
        assert!(!AccessMode::W.is_read() && AccessMode::W.is_write());
        assert!(AccessMode::RW.is_read() && AccessMode::RW.is_write());
        assert!(AccessMode::C.is_read() && !AccessMode::C.is_write());
        assert!(AccessMode::CV.is_read() && AccessMode::CV.is_write());
    }

    #[test]
    fn empty_results_policies() {
        assert!(OnFailure::Ignore.produces_empty_results_on_failure());
        assert!(OnFailure::CancelSuccessors.produces_empty_results_on_failure());
        assert!(!OnFailure::Retry.produces_empty_results_on_failure());
        assert!(!OnFailure::Fail.produces_empty_results_on_failure());
    }
}
