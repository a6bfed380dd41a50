use std::sync::{Arc, Condvar, Mutex};

struct Inner {
    permits: Mutex<Option<usize>>,
    available: Condvar,
}

/// Counting semaphore shared between the application threads and the
/// runtime loops. `None` permits means an unbounded pool (acquire never
/// blocks), which is the default task throttle.
#[derive(Clone)]
pub struct Semaphore {
    inner: Arc<Inner>,
}

impl Semaphore {
    pub fn new(permits: Option<usize>) -> Self {
        Semaphore {
            inner: Arc::new(Inner {
                permits: Mutex::new(permits),
                available: Condvar::new(),
            }),
        }
    }

    /// Take one permit, blocking while none is available.
    pub fn acquire(&self) {
        let mut permits = self.inner.permits.lock().unwrap();
        loop {
            match *permits {
                None => return,
                Some(n) if n > 0 => {
                    *permits = Some(n - 1);
                    return;
                }
                Some(_) => {
                    permits = self.inner.available.wait(permits).unwrap();
                }
            }
        }
    }

    /// Return one permit, waking a blocked acquirer.
    pub fn release(&self) {
        let mut permits = self.inner.permits.lock().unwrap();
        if let Some(n) = *permits {
            *permits = Some(n + 1);
            self.inner.available.notify_one();
        }
    }

    /// Current number of free permits; `None` for an unbounded pool.
    pub fn available_permits(&self) -> Option<usize> {
        *self.inner.permits.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn unbounded_never_blocks() {
        let sem = Semaphore::new(None);
        for _ in 0..1000 {
            sem.acquire();
        }
        assert_eq!(sem.available_permits(), None);
    }

    #[test]
    fn release_unblocks_acquirer() {
        let sem = Semaphore::new(Some(1));
        sem.acquire();
        let sem2 = sem.clone();
        let handle = thread::spawn(move || {
            sem2.acquire();
        });
        thread::sleep(Duration::from_millis(20));
        sem.release();
        handle.join().unwrap();
        assert_eq!(sem.available_permits(), Some(0));
    }
}
