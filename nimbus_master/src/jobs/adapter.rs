use std::path::Path;
use std::sync::mpsc::Sender;

use futures::sync::mpsc::UnboundedSender;

use nimbus_core::errors::Result;
use nimbus_core::types::JobId;

use jobs::JobDescription;
use td::TdEvent;

/// Transport contract every adapter satisfies. The core never speaks a wire
/// protocol itself: it hands jobs to an adapter and receives lifecycle
/// events back on the dispatcher queue.
///
/// `run_job` and `cancel_job` must not block; outcomes are posted
/// asynchronously through the sender given to `attach`. Data transfers are
/// driven out-of-band by the `get_data`/`exists_data` hooks.
pub trait CommAdapter: Send + Sync {
    /// Wires the adapter to the dispatcher queue. Called once before any
    /// job is submitted.
    fn attach(&self, events: UnboundedSender<TdEvent>);

    fn run_job(&self, job: JobDescription);

    fn cancel_job(&self, job_id: JobId);

    /// Fetches the bytes of a renaming into a local destination; the
    /// listener is signalled when the transfer ends.
    fn get_data(&self, renaming: &str, destination: &Path, listener: Sender<Result<()>>);

    fn exists_data(&self, renaming: &str) -> bool;
}
