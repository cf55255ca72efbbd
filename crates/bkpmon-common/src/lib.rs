// bkpmon-common: shared services and infrastructure for the MonitoramentoBKP
// terminal agent.

pub mod constants;
pub mod host_context;
pub mod http_client_factory;
pub mod logging;
pub mod tracing;
pub mod version_store;

// ---------------------------------------------------------------------------
// Re-exports for convenient access
// ---------------------------------------------------------------------------

pub use constants::{OsPlatform, WellKnownDirectory, WellKnownFile, CURRENT_PLATFORM};
pub use host_context::{HostContext, ShutdownReason};
pub use http_client_factory::HttpClientFactory;
pub use logging::TailLog;
pub use tracing::{TraceEventType, TraceManager, TraceSetting, Tracing};
pub use version_store::{VersionState, VersionStore};
