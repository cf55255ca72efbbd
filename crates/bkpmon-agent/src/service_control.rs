// Control of the OS-level service wrapping the agent ("BaseService"),
// consumed by the update flow when the agent's own executable is replaced.

use bkpmon_common::constants::{self, defaults};
use bkpmon_common::host_context::HostContext;
use bkpmon_common::tracing::Tracing;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::process::Command;

/// The service-control seam consumed by the update flow.
///
/// Every operation returns `(succeeded, detail)`; failures are reported, not
/// raised, because a stuck service manager must not abort an update.
#[async_trait]
pub trait ServiceController: Send + Sync {
    async fn start(&self) -> (bool, String);
    async fn stop(&self) -> (bool, String);
    async fn status(&self) -> (bool, String);
}

/// Controls the service through the platform service manager: `sc` on
/// Windows, `systemctl` elsewhere.
pub struct SystemServiceController {
    service_name: String,
    trace: Tracing,
}

impl SystemServiceController {
    pub fn new(context: &Arc<HostContext>) -> Self {
        let service_name = std::env::var(constants::variables::SERVICE_NAME)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| defaults::SERVICE_NAME.to_string());

        Self {
            service_name,
            trace: context.get_trace("ServiceController"),
        }
    }

    /// The name of the managed service.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    async fn run_manager(&self, action: &str) -> (bool, String) {
        let (program, args): (&str, Vec<&str>) = if cfg!(windows) {
            let verb = match action {
                "status" => "query",
                other => other,
            };
            ("sc", vec![verb, self.service_name.as_str()])
        } else {
            let verb = match action {
                "status" => "is-active",
                other => other,
            };
            ("systemctl", vec![verb, self.service_name.as_str()])
        };

        self.trace
            .verbose(&format!("Running {} {:?}", program, args));

        match Command::new(program).args(&args).output().await {
            Ok(output) => {
                let mut detail = String::from_utf8_lossy(&output.stdout).trim().to_string();
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.trim().is_empty() {
                    if !detail.is_empty() {
                        detail.push('\n');
                    }
                    detail.push_str(stderr.trim());
                }
                (output.status.success(), detail)
            }
            Err(e) => (false, format!("failed to run {}: {}", program, e)),
        }
    }
}

#[async_trait]
impl ServiceController for SystemServiceController {
    async fn start(&self) -> (bool, String) {
        self.trace
            .info(&format!("Starting service {}", self.service_name));
        self.run_manager("start").await
    }

    async fn stop(&self) -> (bool, String) {
        self.trace
            .info(&format!("Stopping service {}", self.service_name));
        let result = self.run_manager("stop").await;
        // Give the service manager a moment to actually release the binary.
        tokio::time::sleep(constants::SERVICE_STOP_SETTLE).await;
        result
    }

    async fn status(&self) -> (bool, String) {
        self.run_manager("status").await
    }
}
