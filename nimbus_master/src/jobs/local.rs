use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::sync::mpsc::UnboundedSender;

use nimbus_core::errors::Result;
use nimbus_core::types::{JobEndStatus, JobId};

use jobs::JobDescription;
use td::TdEvent;

/// What a registered core element produced.
pub enum LocalOutcome {
    Success { outputs: HashMap<String, Vec<u8>> },
    Failure { status: JobEndStatus, message: String },
    Exception { message: String },
}

pub type CoreElementFn = Arc<Fn(&JobDescription) -> LocalOutcome + Send + Sync>;

struct Inner {
    events: Mutex<Option<UnboundedSender<TdEvent>>>,
    registry: Mutex<HashMap<String, CoreElementFn>>,
    store: Mutex<HashMap<String, Vec<u8>>>,
    cancelled: Mutex<HashSet<JobId>>,
    queue: Mutex<Sender<JobDescription>>,
}

/// In-process adapter: a small thread pool standing in for a remote
/// transport. Core elements are registered by implementation signature;
/// unregistered ones succeed producing empty outputs, which is enough for
/// dependency-level testing and the demo driver.
#[derive(Clone)]
pub struct LocalAdapter {
    inner: Arc<Inner>,
}

impl LocalAdapter {
    pub fn new(threads: usize) -> Self {
        let threads = if threads == 0 {
            ::num_cpus::get()
        } else {
            threads
        };
        let (sx, rx) = channel::<JobDescription>();
        let inner = Arc::new(Inner {
            events: Mutex::new(None),
            registry: Mutex::new(HashMap::new()),
            store: Mutex::new(HashMap::new()),
            cancelled: Mutex::new(HashSet::new()),
            queue: Mutex::new(sx),
        });

        let shared_rx = Arc::new(Mutex::new(rx));
        for i in 0..threads {
            let rx = shared_rx.clone();
            let inner = inner.clone();
            ::std::thread::Builder::new()
                .name(format!("local-executor-{}", i))
                .spawn(move || loop {
                    let job = {
                        let guard = rx.lock().unwrap();
                        guard.recv()
                    };
                    match job {
                        Ok(job) => execute(&inner, job),
                        Err(_) => break,
                    }
                })
                .expect("cannot spawn local executor");
        }

        LocalAdapter { inner }
    }

    /// Registers the function run for every job whose implementation carries
    /// the given signature.
    pub fn register_core_element<F>(&self, signature: &str, f: F)
    where
        F: Fn(&JobDescription) -> LocalOutcome + Send + Sync + 'static,
    {
        self.inner
            .registry
            .lock()
            .unwrap()
            .insert(signature.to_string(), Arc::new(f));
    }

    /// Seeds the store with an externally produced value.
    pub fn put_data(&self, renaming: &str, bytes: Vec<u8>) {
        self.inner
            .store
            .lock()
            .unwrap()
            .insert(renaming.to_string(), bytes);
    }

    pub fn stored_value(&self, renaming: &str) -> Option<Vec<u8>> {
        self.inner.store.lock().unwrap().get(renaming).cloned()
    }
}

fn post(inner: &Arc<Inner>, event: TdEvent) {
    let guard = inner.events.lock().unwrap();
    if let Some(ref sender) = *guard {
        // The dispatcher may already be gone during shutdown
        let _ = sender.unbounded_send(event);
    }
}

fn execute(inner: &Arc<Inner>, job: JobDescription) {
    let job_id = job.job_id;
    if inner.cancelled.lock().unwrap().remove(&job_id) {
        post(
            inner,
            TdEvent::JobFailed {
                job_id,
                status: JobEndStatus::ExecutionFailed,
                message: "job cancelled before execution".to_string(),
            },
        );
        return;
    }

    let start = Instant::now();
    let func = inner
        .registry
        .lock()
        .unwrap()
        .get(&job.implementation.signature)
        .cloned();

    let outcome = match func {
        Some(f) => f(&job),
        None => LocalOutcome::Success {
            outputs: HashMap::new(),
        },
    };

    match outcome {
        LocalOutcome::Success { mut outputs } => {
            let mut locations = Vec::new();
            {
                let mut store = inner.store.lock().unwrap();
                for param in job.params.iter() {
                    if let Some(ref renaming) = param.write {
                        let bytes = outputs.remove(renaming).unwrap_or_default();
                        store.insert(renaming.clone(), bytes);
                        locations.push((renaming.clone(), job.worker.clone()));
                    }
                }
            }
            let elapsed = start.elapsed();
            let duration_ms =
                elapsed.as_secs() as f64 * 1e3 + f64::from(elapsed.subsec_nanos()) / 1e6;
            post(
                inner,
                TdEvent::JobCompleted {
                    job_id,
                    duration_ms,
                    outputs: locations,
                },
            );
        }
        LocalOutcome::Failure { status, message } => {
            post(
                inner,
                TdEvent::JobFailed {
                    job_id,
                    status,
                    message,
                },
            );
        }
        LocalOutcome::Exception { message } => {
            post(inner, TdEvent::JobException { job_id, message });
        }
    }
}

impl super::adapter::CommAdapter for LocalAdapter {
    fn attach(&self, events: UnboundedSender<TdEvent>) {
        *self.inner.events.lock().unwrap() = Some(events);
    }

    fn run_job(&self, job: JobDescription) {
        debug!(
            "Submitting job {} (task {}) to the local pool",
            job.job_id, job.task_id
        );
        self.inner
            .queue
            .lock()
            .unwrap()
            .send(job)
            .expect("local pool is gone");
    }

    fn cancel_job(&self, job_id: JobId) {
        self.inner.cancelled.lock().unwrap().insert(job_id);
    }

    fn get_data(&self, renaming: &str, destination: &Path, listener: Sender<Result<()>>) {
        let bytes = self.stored_value(renaming);
        let result = match bytes {
            Some(bytes) => ::std::fs::write(destination, bytes).map_err(|e| e.into()),
            None => Err(format!("renaming {} not present in the local store", renaming).into()),
        };
        let _ = listener.send(result);
    }

    fn exists_data(&self, renaming: &str) -> bool {
        self.inner.store.lock().unwrap().contains_key(renaming)
    }
}

/// Convenience constructor for a failure outcome.
pub fn failure(status: JobEndStatus, message: &str) -> LocalOutcome {
    LocalOutcome::Failure {
        status,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobs::adapter::CommAdapter;

    #[test]
    fn data_store_roundtrip() {
        let adapter = LocalAdapter::new(1);
        adapter.put_data("d1v1", vec![1, 2, 3]);
        assert!(adapter.exists_data("d1v1"));
        assert!(!adapter.exists_data("d1v2"));

        let dir = ::std::env::temp_dir().join("nimbus-local-adapter-test");
        let _ = ::std::fs::create_dir_all(&dir);
        let dest = dir.join("d1v1");
        let (sx, rx) = ::std::sync::mpsc::channel();
        adapter.get_data("d1v1", &dest, sx);
        rx.recv().unwrap().unwrap();
        assert_eq!(::std::fs::read(&dest).unwrap(), vec![1, 2, 3]);
    }
}
