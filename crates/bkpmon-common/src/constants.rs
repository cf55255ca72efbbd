// Constants shared across the agent: well-known directories and files,
// platform detection, scheduling defaults, and environment variable names.

use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Well-known directories used by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownDirectory {
    /// The installation root (the directory containing the agent binary).
    Root,
    /// The log directory under the installation root.
    Logs,
}

impl fmt::Display for WellKnownDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Well-known files read and written by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownFile {
    /// The local version-state document (`versao.config`).
    VersionState,
    /// The cached copy of the last successfully fetched remote config.
    ConfigCache,
    /// The operator-visible tail log (`logs/agent.log`).
    AgentLog,
}

impl fmt::Display for WellKnownFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Operating system platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsPlatform {
    Linux,
    MacOS,
    Windows,
}

impl fmt::Display for OsPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OsPlatform::Linux => write!(f, "Linux"),
            OsPlatform::MacOS => write!(f, "OSX"),
            OsPlatform::Windows => write!(f, "Windows"),
        }
    }
}

// ---------------------------------------------------------------------------
// Platform detection (compile-time)
// ---------------------------------------------------------------------------

/// The current OS platform, detected at compile time.
#[cfg(target_os = "linux")]
pub const CURRENT_PLATFORM: OsPlatform = OsPlatform::Linux;
#[cfg(target_os = "macos")]
pub const CURRENT_PLATFORM: OsPlatform = OsPlatform::MacOS;
#[cfg(target_os = "windows")]
pub const CURRENT_PLATFORM: OsPlatform = OsPlatform::Windows;
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
pub const CURRENT_PLATFORM: OsPlatform = OsPlatform::Linux; // default fallback

// ---------------------------------------------------------------------------
// File names
// ---------------------------------------------------------------------------

/// File name of the local version-state document.
pub const VERSION_STATE_FILE: &str = "versao.config";

/// File name of the config cache.
pub const CONFIG_CACHE_FILE: &str = "config_cache.json";

/// Directory name for logs, under the installation root.
pub const LOG_DIRECTORY: &str = "logs";

/// File name of the operator tail log, under the log directory.
pub const AGENT_LOG_FILE: &str = "agent.log";

/// File name of the backup validation executable, under the installation root.
pub const VALIDATION_EXECUTABLE: &str = "valida_bkp.exe";

// ---------------------------------------------------------------------------
// Scheduling / update defaults
// ---------------------------------------------------------------------------

pub mod defaults {
    use std::time::Duration;

    /// Sleep between polling ticks.
    pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

    /// Timeout for the remote config fetch.
    pub const CONFIG_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

    /// Timeout for a single file download during an update.
    pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

    /// Tolerance window after a scheduled time-of-day during which the task
    /// is still eligible to fire.
    pub const TOLERANCE_MINUTES: i64 = 5;

    /// Minimum spacing of the per-task "waiting for window" diagnostics.
    pub const WAITING_LOG_INTERVAL: Duration = Duration::from_secs(60);

    /// Settle delay between file replacements during an update, so slow
    /// store links are not hammered.
    pub const UPDATE_SETTLE_DELAY: Duration = Duration::from_millis(200);

    /// Number of lines the operator tail log is truncated to on every write.
    pub const MAX_TAIL_LOG_LINES: usize = 100;

    /// Version assumed when no local version-state file exists.
    pub const VERSION: &str = "0.0.0";

    /// Host role assumed when no local version-state file exists.
    pub const HOST_ROLE: &str = "CX1";

    /// Name of the OS service wrapping the agent.
    pub const SERVICE_NAME: &str = "BaseService";

    /// Remote config document URL used when no override is set.
    pub const CONFIG_URL: &str =
        "https://raw.githubusercontent.com/wagnerdeandradesoares/monitoramento-bkp/master/dist/config.json";
}

/// The grace period given to the service manager after a stop request.
pub const SERVICE_STOP_SETTLE: Duration = Duration::from_secs(3);

// ---------------------------------------------------------------------------
// Environment variable names
// ---------------------------------------------------------------------------

pub mod variables {
    /// Overrides the remote config document URL.
    pub const CONFIG_URL: &str = "BKPMON_CONFIG_URL";

    /// Overrides the polling interval, in seconds.
    pub const POLL_SECONDS: &str = "BKPMON_POLL_SECONDS";

    /// Overrides the OS service name.
    pub const SERVICE_NAME: &str = "BKPMON_SERVICE_NAME";

    /// When truthy, trace output is also printed to stdout.
    pub const PRINT_LOG_TO_STDOUT: &str = "BKPMON_PRINT_LOG_TO_STDOUT";
}

// ---------------------------------------------------------------------------
// ReturnCode
// ---------------------------------------------------------------------------

/// Process return / exit codes.
pub mod return_code {
    pub const SUCCESS: i32 = 0;
    pub const TERMINATED_ERROR: i32 = 1;
}
