//! System-wide constants and default paths.

/// Mount point of the kernel's per-process metadata filesystem.
pub const PROC_ROOT: &str = "/proc";

/// Cgroups v2 unified hierarchy mount point.
pub const CGROUP_V2_PATH: &str = "/sys/fs/cgroup";

/// Parent cgroup under which every container scope is created.
pub const DEFAULT_CGROUP_PARENT: &str = "vessel";

/// Grace period between `SIGTERM` and `SIGKILL` during a graceful stop.
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 10_000;

/// How long to wait for the init process to die after `SIGKILL`.
pub const DEFAULT_KILL_TIMEOUT_MS: u64 = 2_000;

/// Interval between non-blocking exit checks in bounded waits.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Number of `cgroup.events` reads before a freeze is reported as timed out.
pub const DEFAULT_FREEZE_RETRIES: u32 = 1_000;

/// Upper bound of cgroup v1 CPU shares, used for the v2 weight conversion.
pub const CPU_SHARES_MAX: u64 = 262_144;

/// Upper bound of the cgroup v2 `cpu.weight` interface.
pub const CPU_WEIGHT_MAX: u64 = 10_000;

/// Name of the persisted state file inside a container's state directory.
pub const STATE_FILENAME: &str = "state.json";
