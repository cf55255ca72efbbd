// The agent orchestrator: fetch config, reconcile the installed version,
// evaluate the schedule, sleep, repeat forever. No error in a tick ever
// propagates out of the loop; liveness is the primary invariant.

use crate::config_fetcher::{ConfigFetcher, FetchOutcome};
use crate::distributor::HttpDistributor;
use crate::process_launcher::{Launcher, ProcessLauncher};
use crate::schedule::ScheduleConfig;
use crate::scheduler::TaskScheduler;
use crate::service_control::SystemServiceController;
use crate::update_flow::UpdateFlow;
use crate::version_gate;

use bkpmon_common::constants::{self, defaults, return_code};
use bkpmon_common::host_context::{HostContext, ShutdownReason};
use bkpmon_common::tracing::Tracing;
use bkpmon_common::version_store::VersionStore;

use anyhow::Result;
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;

/// The long-lived agent process.
pub struct Agent {
    context: Arc<HostContext>,
    trace: Tracing,
    fetcher: ConfigFetcher,
    version_store: VersionStore,
    update_flow: UpdateFlow,
    scheduler: TaskScheduler,
    poll_interval: Duration,
}

impl Agent {
    /// Build the agent with its production collaborators.
    pub fn new(context: Arc<HostContext>) -> Self {
        let trace = context.get_trace("Agent");

        let config_url = std::env::var(constants::variables::CONFIG_URL)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| defaults::CONFIG_URL.to_string());

        let poll_interval = std::env::var(constants::variables::POLL_SECONDS)
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults::POLL_INTERVAL);

        let own_executable = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());

        let launcher: Arc<dyn Launcher> = Arc::new(ProcessLauncher::new(context.clone()));

        let update_flow = UpdateFlow::new(
            context.clone(),
            Arc::new(HttpDistributor::new(&context)),
            Arc::new(SystemServiceController::new(&context)),
            launcher.clone(),
            own_executable,
        );

        Self {
            fetcher: ConfigFetcher::new(&context, config_url),
            version_store: VersionStore::new(&context),
            update_flow,
            scheduler: TaskScheduler::new(&context, launcher),
            poll_interval,
            trace,
            context,
        }
    }

    /// Run the polling loop until shutdown. Returns the process exit code.
    pub async fn run(&mut self) -> Result<i32> {
        self.install_signal_handlers();

        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        self.trace.info(&format!(
            "Agent started on {} ({}), polling every {}s",
            host,
            bkpmon_common::CURRENT_PLATFORM,
            self.poll_interval.as_secs()
        ));

        let shutdown = self.context.shutdown_token();

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            self.tick().await;

            self.context
                .delay(self.poll_interval, shutdown.clone())
                .await;
        }

        self.trace.info(&format!(
            "Agent stopping ({})",
            self.context
                .shutdown_reason()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown reason".to_string())
        ));

        Ok(return_code::SUCCESS)
    }

    /// One polling tick. Every failure is handled locally; this function
    /// never returns an error.
    async fn tick(&mut self) {
        let state = self.version_store.load_or_create();

        let config = match self.fetcher.fetch().await {
            FetchOutcome::Fresh(config) => config,
            FetchOutcome::Cached(config) => config,
            FetchOutcome::Unavailable => {
                self.trace
                    .warning("No config available; skipping this tick");
                return;
            }
        };

        self.reconcile_version(&config, &state).await;

        let now = Local::now().naive_local();
        self.scheduler.run_tick(&config, now, &state.role).await;
    }

    /// Run the update flow when the remote version is newer, or when the
    /// document forces a re-sync.
    async fn reconcile_version(
        &mut self,
        config: &ScheduleConfig,
        state: &bkpmon_common::version_store::VersionState,
    ) {
        let due = version_gate::is_update_due(&state.version, &config.version);
        if !due && !config.download {
            return;
        }

        if due {
            self.trace.info(&format!(
                "New version detected: {} (local: {})",
                config.version, state.version
            ));
        } else {
            self.trace
                .info("Versions match but the document forces a re-sync");
        }

        let outcome = self.update_flow.apply(config, state).await;
        self.trace.verbose(&format!("Update outcome: {:?}", outcome));
    }

    /// Ctrl-C / SIGTERM trigger a graceful shutdown between suspension
    /// points, mirroring how the wrapping service stops the agent.
    fn install_signal_handlers(&self) {
        let context = self.context.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received; initiating graceful shutdown");
                context.shutdown(ShutdownReason::UserCancelled);
            }
        });

        #[cfg(unix)]
        {
            let context = self.context.clone();
            tokio::spawn(async move {
                let mut sigterm = match tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate(),
                ) {
                    Ok(signal) => signal,
                    Err(e) => {
                        tracing::warn!("Could not install SIGTERM handler: {}", e);
                        return;
                    }
                };
                sigterm.recv().await;
                tracing::info!("SIGTERM received; initiating graceful shutdown");
                context.shutdown(ShutdownReason::OperatingSystemShutdown);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    //! End-to-end tick behavior, with the network and process seams faked:
    //! a new remote version is installed first, then the scheduled
    //! validation task fires exactly once inside its window.

    use super::*;
    use crate::distributor::Distributor;
    use crate::process_launcher::LaunchError;
    use crate::service_control::ServiceController;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    struct FakeDistributor;

    #[async_trait]
    impl Distributor for FakeDistributor {
        async fn download_and_replace(&self, _url: &str, _dest: &Path) -> Result<bool> {
            Ok(true)
        }
    }

    struct FakeService;

    #[async_trait]
    impl ServiceController for FakeService {
        async fn start(&self) -> (bool, String) {
            (true, String::new())
        }
        async fn stop(&self) -> (bool, String) {
            (true, String::new())
        }
        async fn status(&self) -> (bool, String) {
            (true, String::new())
        }
    }

    struct FakeLauncher {
        root: PathBuf,
        launches: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Launcher for FakeLauncher {
        fn resolve(&self, name: &str, _location: Option<&str>) -> Result<PathBuf, LaunchError> {
            Ok(self.root.join(name))
        }
        async fn launch_and_wait(
            &self,
            path: &Path,
            _capture_output: bool,
        ) -> Result<i32, LaunchError> {
            self.launches
                .lock()
                .unwrap()
                .push(path.file_name().unwrap().to_string_lossy().into_owned());
            Ok(0)
        }
    }

    #[tokio::test]
    async fn update_then_single_scheduled_fire() {
        let dir = tempfile::tempdir().unwrap();
        let context = HostContext::new();
        context.set_root_override(dir.path().to_path_buf());

        let launcher = Arc::new(FakeLauncher {
            root: dir.path().to_path_buf(),
            launches: Mutex::new(Vec::new()),
        });

        let store = VersionStore::new(&context);
        let state = store.load_or_create();
        assert_eq!(state.version, "0.0.0");

        let config = ScheduleConfig::parse(
            br#"{
                "versao": "1.0.1",
                "executar": [{"nome": "valida_bkp.exe", "ativo": true, "horario": "12:00"}]
            }"#,
        )
        .unwrap();

        // Update runs first: 1.0.0-era state is behind 1.0.1.
        assert!(version_gate::is_update_due(&state.version, &config.version));

        let update_flow = UpdateFlow::new(
            context.clone(),
            Arc::new(FakeDistributor),
            Arc::new(FakeService),
            launcher.clone(),
            "bkpmon-agent.exe".into(),
        );
        let outcome = update_flow.apply(&config, &state).await;
        assert!(outcome.version_persisted);
        assert_eq!(store.load_or_create().version, "1.0.1");

        // The update flow already ran the validation task once, post-update.
        assert_eq!(launcher.launches.lock().unwrap().len(), 1);

        // At 12:02 the scheduled task fires exactly once, across repeated
        // ticks inside the window.
        let mut scheduler = TaskScheduler::new(&context, launcher.clone());
        let noon_02 = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(12, 2, 0)
            .unwrap();
        let noon_04 = noon_02 + chrono::Duration::minutes(2);

        scheduler.run_tick(&config, noon_02, "CX1").await;
        scheduler.run_tick(&config, noon_04, "CX1").await;

        assert_eq!(launcher.launches.lock().unwrap().len(), 2);
        assert_eq!(scheduler.ledger().len(), 1);
        assert!(scheduler
            .ledger()
            .contains("valida_bkp.exe|12:00|2024-03-05"));
    }
}
