// The update flow: replace the files listed in the schedule document,
// stopping and restarting the wrapping service when the agent's own
// executable is among them, persist the new version, and run the post-update
// validation task.

use crate::distributor::Distributor;
use crate::process_launcher::{LaunchError, Launcher};
use crate::schedule::{FileSpec, ScheduleConfig};
use crate::service_control::ServiceController;

use bkpmon_common::constants::{defaults, WellKnownDirectory, VALIDATION_EXECUTABLE};
use bkpmon_common::host_context::HostContext;
use bkpmon_common::tracing::Tracing;
use bkpmon_common::version_store::{VersionState, VersionStore};

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What an update pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub files_replaced: usize,
    pub files_failed: usize,
    pub version_persisted: bool,
}

/// Orchestrates a single update pass over the schedule document's file list.
pub struct UpdateFlow {
    context: Arc<HostContext>,
    trace: Tracing,
    distributor: Arc<dyn Distributor>,
    service: Arc<dyn ServiceController>,
    launcher: Arc<dyn Launcher>,
    version_store: VersionStore,
    /// File name of the running agent binary, compared case-insensitively
    /// against replacement targets.
    own_executable: String,
}

impl UpdateFlow {
    pub fn new(
        context: Arc<HostContext>,
        distributor: Arc<dyn Distributor>,
        service: Arc<dyn ServiceController>,
        launcher: Arc<dyn Launcher>,
        own_executable: String,
    ) -> Self {
        let trace = context.get_trace("UpdateFlow");
        let version_store = VersionStore::new(&context);
        Self {
            context,
            trace,
            distributor,
            service,
            launcher,
            version_store,
            own_executable,
        }
    }

    /// Apply the update described by `config` to this terminal.
    ///
    /// Individual file failures are logged and counted, never raised; an
    /// unreachable mirror must not take the polling loop down with it.
    pub async fn apply(&self, config: &ScheduleConfig, state: &VersionState) -> UpdateOutcome {
        self.trace.info(&format!(
            "Update started: local version {}, remote version {}",
            state.version, config.version
        ));

        let mut outcome = UpdateOutcome::default();

        let replacing_self = config
            .files
            .iter()
            .any(|file| self.is_own_executable(&self.resolve_destination(file)));

        if replacing_self {
            let (stopped, detail) = self.service.stop().await;
            if !stopped {
                self.trace.warning(&format!(
                    "Could not stop service before self-replacement: {}",
                    detail
                ));
            }
        }

        for file in &config.files {
            let dest = self.resolve_destination(file);
            match self.distributor.download_and_replace(&file.url, &dest).await {
                Ok(true) => outcome.files_replaced += 1,
                Ok(false) => {}
                Err(e) => {
                    outcome.files_failed += 1;
                    self.trace
                        .warning(&format!("Failed to update '{}': {:#}", file.name, e));
                }
            }
            tokio::time::sleep(defaults::UPDATE_SETTLE_DELAY).await;
        }

        if replacing_self {
            let (started, detail) = self.service.start().await;
            if !started {
                self.trace.warning(&format!(
                    "Could not restart service after self-replacement: {}",
                    detail
                ));
            }
        }

        if outcome.files_replaced > 0 || state.version != config.version {
            let new_state = VersionState {
                version: config.version.clone(),
                role: state.role.clone(),
                site_id: state.site_id.clone(),
            };
            match self.version_store.save(&new_state) {
                Ok(()) => {
                    outcome.version_persisted = true;
                    self.trace.info(&format!(
                        "Local version updated to {}",
                        new_state.version
                    ));
                }
                Err(e) => {
                    self.trace
                        .warning(&format!("Could not persist local version: {:#}", e));
                }
            }
        } else {
            self.trace
                .info("Nothing changed; local version left untouched");
        }

        let total_failure = !config.files.is_empty()
            && outcome.files_failed == config.files.len();
        if total_failure {
            self.trace
                .warning("Every file replacement failed; skipping post-update validation");
        } else {
            self.run_validation().await;
        }

        self.trace.info(&format!(
            "Update finished: {} replaced, {} failed",
            outcome.files_replaced, outcome.files_failed
        ));

        outcome
    }

    /// Resolve a file's destination path by the same rules as a task's
    /// `local` field: absolute file > absolute directory + name >
    /// root-relative directory + name > installation root + name.
    fn resolve_destination(&self, file: &FileSpec) -> PathBuf {
        let root = self.context.get_directory(WellKnownDirectory::Root);
        match file.destination.as_deref() {
            Some(destination) => {
                let candidate = Path::new(destination);
                if candidate.is_absolute() {
                    if candidate.extension().is_some() {
                        candidate.to_path_buf()
                    } else {
                        candidate.join(&file.name)
                    }
                } else {
                    root.join(destination).join(&file.name)
                }
            }
            None => root.join(&file.name),
        }
    }

    fn is_own_executable(&self, dest: &Path) -> bool {
        dest.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.eq_ignore_ascii_case(&self.own_executable))
            .unwrap_or(false)
    }

    /// Run the backup validation task and wait for it, as the last step of
    /// an update.
    async fn run_validation(&self) {
        match self.launcher.resolve(VALIDATION_EXECUTABLE, None) {
            Ok(path) => match self.launcher.launch_and_wait(&path, false).await {
                Ok(code) => self.trace.info(&format!(
                    "Post-update validation finished with code {}",
                    code
                )),
                Err(e) => self
                    .trace
                    .warning(&format!("Post-update validation failed: {}", e)),
            },
            Err(LaunchError::NotFound(path)) => {
                self.trace.warning(&format!(
                    "Validation executable not found at {:?}; skipping",
                    path
                ));
            }
            Err(e) => {
                self.trace
                    .warning(&format!("Could not resolve validation executable: {}", e));
            }
        }
    }
}
