// Tracing infrastructure: per-component trace sources that dispatch to the
// `tracing` crate and, for operator-relevant levels, to the tail log.

use crate::logging::TailLog;

use chrono::Utc;
use std::sync::Arc;

/// Trace event severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEventType {
    Verbose,
    Information,
    Warning,
    Error,
}

impl std::fmt::Display for TraceEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceEventType::Verbose => write!(f, "VERB"),
            TraceEventType::Information => write!(f, "INFO"),
            TraceEventType::Warning => write!(f, "WARN"),
            TraceEventType::Error => write!(f, "ERR "),
        }
    }
}

/// Configuration for trace output.
#[derive(Debug, Clone)]
pub struct TraceSetting {
    /// Minimum severity level to emit.
    pub level: TraceEventType,
    /// Whether to also print to stdout.
    pub print_to_stdout: bool,
}

impl Default for TraceSetting {
    fn default() -> Self {
        Self {
            level: TraceEventType::Verbose,
            print_to_stdout: false,
        }
    }
}

/// A named trace source.
///
/// Each component gets its own `Tracing` instance. Verbose output goes to
/// the `tracing` crate only; information and above are also appended to the
/// shared tail log when one is attached.
#[derive(Clone)]
pub struct Tracing {
    name: String,
    setting: TraceSetting,
    tail_log: Option<Arc<TailLog>>,
}

impl Tracing {
    /// Create a new `Tracing` instance.
    pub fn new(
        name: impl Into<String>,
        setting: TraceSetting,
        tail_log: Option<Arc<TailLog>>,
    ) -> Self {
        Self {
            name: name.into(),
            setting,
            tail_log,
        }
    }

    /// Get the name of this trace source.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn trace(&self, event_type: TraceEventType, message: &str) {
        if (event_type as u8) < (self.setting.level as u8) {
            return;
        }

        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        let formatted = format!("[{}][{}] {}: {}", timestamp, &self.name, event_type, message);

        match event_type {
            TraceEventType::Error => tracing::error!("{}", formatted),
            TraceEventType::Warning => tracing::warn!("{}", formatted),
            TraceEventType::Information => tracing::info!("{}", formatted),
            TraceEventType::Verbose => tracing::debug!("{}", formatted),
        }

        if self.setting.print_to_stdout {
            println!("{}", formatted);
        }

        if event_type != TraceEventType::Verbose {
            if let Some(ref tail) = self.tail_log {
                tail.append(&format!("{}: {}", &self.name, message));
            }
        }
    }

    /// Log an informational message.
    pub fn info(&self, message: &str) {
        self.trace(TraceEventType::Information, message);
    }

    /// Log a verbose / debug message.
    pub fn verbose(&self, message: &str) {
        self.trace(TraceEventType::Verbose, message);
    }

    /// Log a warning message.
    pub fn warning(&self, message: &str) {
        self.trace(TraceEventType::Warning, message);
    }

    /// Log an error message.
    pub fn error(&self, message: &str) {
        self.trace(TraceEventType::Error, message);
    }

    /// Log an error with its source chain.
    pub fn error_err(&self, err: &dyn std::error::Error) {
        self.error(&format!("{}", err));
        let mut source = err.source();
        while let Some(cause) = source {
            self.error(&format!("  caused by: {}", cause));
            source = cause.source();
        }
    }
}

/// Manages trace sources across the process. Each source is identified by a
/// string name; all share the same setting and tail log.
pub struct TraceManager {
    default_setting: TraceSetting,
    tail_log: std::sync::Mutex<Option<Arc<TailLog>>>,
}

impl TraceManager {
    /// Create a new `TraceManager` with the given setting.
    pub fn with_setting(setting: TraceSetting) -> Self {
        Self {
            default_setting: setting,
            tail_log: std::sync::Mutex::new(None),
        }
    }

    /// Attach the shared tail log. Trace sources created after this call
    /// will feed it; sources created earlier keep writing only to `tracing`.
    pub fn attach_tail_log(&self, tail_log: Arc<TailLog>) {
        *self.tail_log.lock().unwrap() = Some(tail_log);
    }

    /// Get (create) a named trace source.
    pub fn get(&self, name: &str) -> Tracing {
        let tail = self.tail_log.lock().unwrap().clone();
        Tracing::new(name, self.default_setting.clone(), tail)
    }
}

impl Default for TraceManager {
    fn default() -> Self {
        Self::with_setting(TraceSetting::default())
    }
}
