/// Paths, units and exit codes shared across the plugin
use std::time::Duration;

/// Directory holding block device special files
pub const DEV_ROOT: &str = "/dev";

/// Per-device statistics and queue attributes
pub const SYS_BLOCK_ROOT: &str = "/sys/block";

/// Default directory for persisted samples
pub const DEFAULT_STATE_ROOT: &str = "/tmp";

/// File name prefix for persisted samples, followed by `.<device>`
pub const STATE_FILE_PREFIX: &str = "check_iostat";

/// Separator between the fields of a persisted sample
pub const STATE_FIELD_DELIMITER: char = ':';

/// Fractional digits carried by every reported metric
pub const METRIC_PRECISION: u32 = 1;

/// Bytes per KB in throughput figures
pub const BYTES_PER_KB: i128 = 1024;

/// Milliseconds per second, for the weighted I/O time counter
pub const MILLIS_PER_SEC: i128 = 1000;

/// Plugin exit codes understood by the supervisor
pub const EXIT_OK: i32 = 0;
pub const EXIT_WARNING: i32 = 1;
pub const EXIT_CRITICAL: i32 = 2;
pub const EXIT_UNKNOWN: i32 = 3;

/// Longest wait for another run's lock on the same device's sample
pub const STATE_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between attempts to take a held lock
pub const STATE_LOCK_POLL: Duration = Duration::from_millis(50);
