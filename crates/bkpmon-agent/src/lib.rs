// bkpmon-agent: the MonitoramentoBKP terminal agent: polling loop, update
// flow, and task scheduler.

pub mod agent;
pub mod config_fetcher;
pub mod distributor;
pub mod process_launcher;
pub mod run_ledger;
pub mod schedule;
pub mod scheduler;
pub mod service_control;
pub mod throttler;
pub mod update_flow;
pub mod version_gate;

pub use agent::Agent;
pub use config_fetcher::{ConfigFetcher, FetchOutcome};
pub use distributor::{Distributor, HttpDistributor};
pub use process_launcher::{LaunchError, LaunchStrategy, Launcher, ProcessLauncher};
pub use run_ledger::{FireMarker, RunLedger};
pub use schedule::{FileSpec, ScheduleConfig, TaskSchedule, TaskSpec};
pub use scheduler::TaskScheduler;
pub use service_control::{ServiceController, SystemServiceController};
pub use update_flow::{UpdateFlow, UpdateOutcome};
