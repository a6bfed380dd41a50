use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Single escalation point for runtime errors.
///
/// WARN-level problems are logged and the runtime carries on; ERROR-level
/// problems flag the runtime as fatally broken, which drives the driver's
/// exit code and stops new work from being accepted.
#[derive(Clone)]
pub struct ErrorManager {
    fatal: Arc<AtomicBool>,
}

impl ErrorManager {
    pub fn new() -> Self {
        ErrorManager {
            fatal: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn warn(&self, message: &str) {
        warn!("{}", message);
    }

    pub fn error(&self, message: &str) {
        error!("{}", message);
        self.fatal.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn fatal_reached(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }
}

impl Default for ErrorManager {
    fn default() -> Self {
        ErrorManager::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_do_not_poison_the_runtime() {
        let em = ErrorManager::new();
        em.warn("just a warning");
        assert!(!em.fatal_reached());
        em.error("fatal condition");
        assert!(em.fatal_reached());
    }

    #[test]
    fn clones_share_the_fatal_flag() {
        let em = ErrorManager::new();
        let clone = em.clone();
        em.error("boom");
        assert!(clone.fatal_reached());
    }
}
