//! Runtime configuration loaded from environment variables.

/// Default number of versions between two snapshots.
pub const DEFAULT_SNAPSHOT_INTERVAL: u64 = 100;

/// Default number of commands a single cascade may process.
pub const DEFAULT_MAX_CASCADE_STEPS: usize = 1000;

/// Pipeline tuning knobs.
///
/// Reads from environment variables:
/// - `ES_SNAPSHOT_INTERVAL`: versions between snapshots, `0` disables them (default: `100`)
/// - `ES_MAX_CASCADE_STEPS`: commands per cascade before it is aborted (default: `1000`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub snapshot_interval: u64,
    pub max_cascade_steps: usize,
}

impl RuntimeConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            snapshot_interval: std::env::var("ES_SNAPSHOT_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_SNAPSHOT_INTERVAL),
            max_cascade_steps: std::env::var("ES_MAX_CASCADE_STEPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_CASCADE_STEPS),
        }
    }

    pub fn with_snapshot_interval(mut self, interval: u64) -> Self {
        self.snapshot_interval = interval;
        self
    }

    /// Turns snapshot writes off; replay then always starts from version 1.
    pub fn without_snapshots(self) -> Self {
        self.with_snapshot_interval(0)
    }

    pub fn with_max_cascade_steps(mut self, steps: usize) -> Self {
        self.max_cascade_steps = steps;
        self
    }

    pub fn snapshots_enabled(&self) -> bool {
        self.snapshot_interval > 0
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            max_cascade_steps: DEFAULT_MAX_CASCADE_STEPS,
        }
    }
}
