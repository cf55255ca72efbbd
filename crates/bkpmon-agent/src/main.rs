// Entry point for the MonitoramentoBKP terminal agent.
//
// The agent is a long-lived background process managed by the OS service
// wrapper; it takes no command-line flags. The only fatal startup condition
// is an unusable log directory; everything after that recovers locally.

use bkpmon_common::constants::{return_code, WellKnownDirectory, WellKnownFile};
use bkpmon_common::host_context::HostContext;
use bkpmon_common::logging::TailLog;

use bkpmon_agent::Agent;

use std::sync::Arc;

fn main() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime");

    let exit_code = runtime.block_on(run());

    std::process::exit(exit_code);
}

async fn run() -> i32 {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Terminal agent starting.");
    tracing::info!("  Version  = {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("  Platform = {}", bkpmon_common::CURRENT_PLATFORM);

    let context = HostContext::new();

    // The one fatal startup condition: without a log directory the agent
    // has no way to leave a trail for the operators.
    let log_dir = context.get_directory(WellKnownDirectory::Logs);
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory {:?}: {}", log_dir, e);
        return return_code::TERMINATED_ERROR;
    }

    context.attach_tail_log(Arc::new(TailLog::new(
        context.get_file(WellKnownFile::AgentLog),
    )));

    let mut agent = Agent::new(context);

    match agent.run().await {
        Ok(exit_code) => {
            tracing::info!("Agent exiting with code {}", exit_code);
            exit_code
        }
        Err(e) => {
            tracing::error!("Agent failed: {:?}", e);
            return_code::TERMINATED_ERROR
        }
    }
}
