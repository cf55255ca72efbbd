// The central application context: directory and file resolution, trace
// creation, and graceful shutdown coordination.

use crate::constants::{
    self, WellKnownDirectory, WellKnownFile,
};
use crate::logging::TailLog;
use crate::tracing::{TraceManager, TraceSetting, Tracing};

use std::env;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// The reason the agent is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    UserCancelled,
    OperatingSystemShutdown,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::UserCancelled => write!(f, "UserCancelled"),
            ShutdownReason::OperatingSystemShutdown => write!(f, "OperatingSystemShutdown"),
        }
    }
}

/// The central application context.
///
/// Provides installation-directory resolution, well-known file path lookup,
/// per-component trace creation, and the shutdown token that threads through
/// every suspension point of the polling loop.
pub struct HostContext {
    /// Cancellation token for coordinated agent shutdown.
    shutdown_token: CancellationToken,

    /// The reason the agent is shutting down (set once `shutdown` is called).
    shutdown_reason: Mutex<Option<ShutdownReason>>,

    /// Trace manager for creating per-component trace sources.
    trace_manager: TraceManager,

    /// Override for the installation root directory (used in tests).
    root_override: Mutex<Option<PathBuf>>,
}

impl HostContext {
    /// Create a new `HostContext`.
    pub fn new() -> Arc<Self> {
        let print_to_stdout = env::var(constants::variables::PRINT_LOG_TO_STDOUT)
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true"))
            .unwrap_or(false);

        let trace_setting = TraceSetting {
            print_to_stdout,
            ..TraceSetting::default()
        };

        Arc::new(Self {
            shutdown_token: CancellationToken::new(),
            shutdown_reason: Mutex::new(None),
            trace_manager: TraceManager::with_setting(trace_setting),
            root_override: Mutex::new(None),
        })
    }

    // -----------------------------------------------------------------------
    // Directory / file resolution
    // -----------------------------------------------------------------------

    /// Override the installation root directory (used primarily for testing).
    pub fn set_root_override(&self, path: PathBuf) {
        *self.root_override.lock().unwrap() = Some(path);
    }

    /// Resolve the path for a well-known directory.
    pub fn get_directory(&self, directory: WellKnownDirectory) -> PathBuf {
        match directory {
            WellKnownDirectory::Root => {
                if let Some(ref root) = *self.root_override.lock().unwrap() {
                    return root.clone();
                }
                // The installation root is the directory containing the
                // agent binary.
                env::current_exe()
                    .ok()
                    .and_then(|p| p.parent().map(|p| p.to_path_buf()))
                    .unwrap_or_else(|| PathBuf::from("."))
            }

            WellKnownDirectory::Logs => self
                .get_directory(WellKnownDirectory::Root)
                .join(constants::LOG_DIRECTORY),
        }
    }

    /// Resolve the path for a well-known file.
    pub fn get_file(&self, file: WellKnownFile) -> PathBuf {
        match file {
            WellKnownFile::VersionState => self
                .get_directory(WellKnownDirectory::Root)
                .join(constants::VERSION_STATE_FILE),
            WellKnownFile::ConfigCache => self
                .get_directory(WellKnownDirectory::Root)
                .join(constants::CONFIG_CACHE_FILE),
            WellKnownFile::AgentLog => self
                .get_directory(WellKnownDirectory::Logs)
                .join(constants::AGENT_LOG_FILE),
        }
    }

    // -----------------------------------------------------------------------
    // Tracing
    // -----------------------------------------------------------------------

    /// Attach the shared operator tail log. Must happen before components
    /// create their trace sources, or those sources will skip the tail log.
    pub fn attach_tail_log(&self, tail_log: Arc<TailLog>) {
        self.trace_manager.attach_tail_log(tail_log);
    }

    /// Get a trace source for the given component name.
    pub fn get_trace(&self, name: &str) -> Tracing {
        self.trace_manager.get(name)
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Get the cancellation token that is triggered on agent shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Get the reason the agent is shutting down, if shutdown has begun.
    pub fn shutdown_reason(&self) -> Option<ShutdownReason> {
        *self.shutdown_reason.lock().unwrap()
    }

    /// Initiate agent shutdown with the given reason.
    pub fn shutdown(&self, reason: ShutdownReason) {
        let trace = self.get_trace("HostContext");
        trace.info(&format!("Agent will be shut down for {}", reason));
        *self.shutdown_reason.lock().unwrap() = Some(reason);
        self.shutdown_token.cancel();
    }

    // -----------------------------------------------------------------------
    // Misc
    // -----------------------------------------------------------------------

    /// Sleep for `duration` or until the given token is cancelled.
    pub async fn delay(
        &self,
        duration: std::time::Duration,
        cancellation_token: CancellationToken,
    ) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = cancellation_token.cancelled() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_override_wins() {
        let context = HostContext::new();
        let dir = tempfile::tempdir().unwrap();
        context.set_root_override(dir.path().to_path_buf());

        assert_eq!(
            context.get_directory(WellKnownDirectory::Root),
            dir.path().to_path_buf()
        );
        assert_eq!(
            context.get_file(WellKnownFile::VersionState),
            dir.path().join("versao.config")
        );
        assert_eq!(
            context.get_file(WellKnownFile::AgentLog),
            dir.path().join("logs").join("agent.log")
        );
    }

    #[test]
    fn shutdown_sets_reason_and_cancels_token() {
        let context = HostContext::new();
        let token = context.shutdown_token();

        assert!(context.shutdown_reason().is_none());
        context.shutdown(ShutdownReason::UserCancelled);

        assert!(token.is_cancelled());
        assert_eq!(
            context.shutdown_reason(),
            Some(ShutdownReason::UserCancelled)
        );
    }
}
