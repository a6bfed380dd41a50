use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Recognized environment options, each with a default that keeps the
/// runtime sane when unset.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Permit count of the task throttle; `None` leaves it unbounded.
    pub throttle_max_tasks: Option<usize>,

    /// Where per-application artifacts (event log, fetched result files)
    /// land. `None` keeps the event log in memory.
    pub app_log_dir: Option<PathBuf>,

    pub input_profile: Option<PathBuf>,
    pub output_profile: Option<PathBuf>,

    pub disable_custom_threads_tracing: bool,

    /// Applied to every registered application.
    pub wall_clock_limit: Option<Duration>,

    /// Enables the (slow) consistency checking of the analysis state.
    pub debug_mode: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            throttle_max_tasks: None,
            app_log_dir: None,
            input_profile: None,
            output_profile: None,
            disable_custom_threads_tracing: false,
            wall_clock_limit: None,
            debug_mode: false,
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name).map(|s| s == "1" || s == "true").unwrap_or(false)
}

fn env_path(name: &str) -> Option<PathBuf> {
    env::var(name).ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let throttle_max_tasks = env::var("NIMBUS_THROTTLE_MAX_TASKS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok());
        let wall_clock_limit = env::var("NIMBUS_WALL_CLOCK_LIMIT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);
        RuntimeConfig {
            throttle_max_tasks,
            app_log_dir: env_path("NIMBUS_APP_LOG_DIR"),
            input_profile: env_path("NIMBUS_INPUT_PROFILE"),
            output_profile: env_path("NIMBUS_OUTPUT_PROFILE"),
            disable_custom_threads_tracing: env_flag("NIMBUS_DISABLE_CUSTOM_THREADS_TRACING"),
            wall_clock_limit,
            debug_mode: env_flag("NIMBUS_DEBUG_MODE"),
        }
    }
}

/// Default artifact directory, one per process.
pub fn default_log_directory(basename: &str) -> PathBuf {
    let pid = ::std::process::id();
    PathBuf::from("/tmp/nimbus-logs").join(format!("{}-{}", basename, pid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = RuntimeConfig::default();
        assert!(cfg.throttle_max_tasks.is_none());
        assert!(cfg.app_log_dir.is_none());
        assert!(!cfg.debug_mode);
        assert!(cfg.wall_clock_limit.is_none());
    }
}
