//! Queue configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Tuning knobs for the queueing core.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of concurrent workers. At least one.
    pub workers: usize,
    /// Directory job workspaces are created under.
    pub workspace_root: PathBuf,
    /// Default age cutoff for registry cleanup.
    pub cleanup_max_age: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            workspace_root: env::temp_dir(),
            cleanup_max_age: Duration::from_secs(24 * 3600),
        }
    }
}

impl QueueConfig {
    /// Read knobs from the environment (`NUM_WORKERS`, `WORKSPACE_ROOT`,
    /// `CLEANUP_MAX_AGE_HOURS`), falling back to defaults for anything
    /// unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let workers = env::var("NUM_WORKERS")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(defaults.workers)
            .max(1);
        let workspace_root = env::var("WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.workspace_root);
        let cleanup_max_age = env::var("CLEANUP_MAX_AGE_HOURS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(|hours| Duration::from_secs(hours * 3600))
            .unwrap_or(defaults.cleanup_max_age);
        Self {
            workers,
            workspace_root,
            cleanup_max_age,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.workers, 2);
        assert_eq!(config.cleanup_max_age, Duration::from_secs(86_400));
    }
}
