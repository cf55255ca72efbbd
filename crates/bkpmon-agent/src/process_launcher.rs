// Resolves executable paths and launches external processes with a strategy
// selected by file type. Command scripts and interpreter scripts open in a
// visible console window so store operators can see them run; binaries are
// spawned hidden.

use bkpmon_common::constants::WellKnownDirectory;
use bkpmon_common::host_context::HostContext;
use bkpmon_common::tracing::Tracing;

use async_trait::async_trait;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};

/// Errors from resolving or launching an executable.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// The resolved path does not exist on disk.
    #[error("executable not found: {0}")]
    NotFound(PathBuf),

    /// The process could not be spawned or waited on.
    #[error("failed to launch {path}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How an executable is dispatched, selected by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStrategy {
    /// `.bat` / `.cmd`: through the command interpreter, visible console.
    CommandScript,
    /// `.ps1`: through PowerShell with bypass-policy flags, visible console.
    PowerShellScript,
    /// `.sh`: through the shell, visible console.
    ShellScript,
    /// Anything else: spawned directly, hidden, no redirection.
    Binary,
}

impl LaunchStrategy {
    /// Select the strategy for a path by its extension.
    pub fn for_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "bat" | "cmd" => LaunchStrategy::CommandScript,
            "ps1" => LaunchStrategy::PowerShellScript,
            "sh" => LaunchStrategy::ShellScript,
            _ => LaunchStrategy::Binary,
        }
    }

    fn is_script(self) -> bool {
        !matches!(self, LaunchStrategy::Binary)
    }
}

/// The launching seam used by the scheduler and the update flow, so tests
/// can substitute a recorder.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Resolve an executable path. Resolution order: absolute file >
    /// absolute directory + name > root-relative directory + name >
    /// installation root + name. Fails with `NotFound` when the resolved
    /// path does not exist.
    fn resolve(&self, name: &str, location: Option<&str>) -> Result<PathBuf, LaunchError>;

    /// Launch the executable and wait for it to exit, returning the exit
    /// code. `capture_output` redirects script output to a per-invocation
    /// log file.
    async fn launch_and_wait(
        &self,
        path: &Path,
        capture_output: bool,
    ) -> Result<i32, LaunchError>;
}

/// The real process launcher.
pub struct ProcessLauncher {
    context: Arc<HostContext>,
    trace: Tracing,
}

impl ProcessLauncher {
    pub fn new(context: Arc<HostContext>) -> Self {
        let trace = context.get_trace("ProcessLauncher");
        Self { context, trace }
    }

    /// Spawn the process without waiting.
    pub fn launch(&self, path: &Path, capture_output: bool) -> Result<Child, LaunchError> {
        if !path.exists() {
            return Err(LaunchError::NotFound(path.to_path_buf()));
        }

        let strategy = LaunchStrategy::for_path(path);
        let mut command = self.build_command(strategy, path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                command.current_dir(parent);
            }
        }

        if capture_output && strategy.is_script() {
            match self.open_invocation_log(path) {
                Some((log_path, out, err)) => {
                    self.trace.verbose(&format!(
                        "Redirecting output of {:?} to {:?}",
                        path, log_path
                    ));
                    command.stdout(Stdio::from(out));
                    command.stderr(Stdio::from(err));
                }
                None => {
                    // Redirection is best-effort; run without it.
                }
            }
        }

        self.trace.info(&format!(
            "Launching {:?} ({:?})",
            path, strategy
        ));

        command.spawn().map_err(|source| LaunchError::Spawn {
            path: path.to_path_buf(),
            source,
        })
    }

    fn build_command(&self, strategy: LaunchStrategy, path: &Path) -> Command {
        let mut command = match strategy {
            LaunchStrategy::CommandScript => {
                if cfg!(windows) {
                    let mut c = Command::new("cmd.exe");
                    c.arg("/c").arg(path);
                    c
                } else {
                    let mut c = Command::new("sh");
                    c.arg(path);
                    c
                }
            }
            LaunchStrategy::PowerShellScript => {
                let mut c = Command::new(if cfg!(windows) { "powershell" } else { "pwsh" });
                c.arg("-ExecutionPolicy").arg("Bypass").arg("-File").arg(path);
                c
            }
            LaunchStrategy::ShellScript => {
                let mut c = Command::new("sh");
                c.arg(path);
                c
            }
            LaunchStrategy::Binary => Command::new(path),
        };

        #[cfg(windows)]
        {
            // Scripts open a new visible console for the operator; binaries
            // stay hidden.
            const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            if strategy.is_script() {
                command.creation_flags(CREATE_NEW_CONSOLE);
            } else {
                command.creation_flags(CREATE_NO_WINDOW);
            }
        }

        command
    }

    /// Open the per-invocation output log file, returning two handles to it.
    fn open_invocation_log(
        &self,
        path: &Path,
    ) -> Option<(PathBuf, std::fs::File, std::fs::File)> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("task");
        let log_path = self
            .context
            .get_directory(WellKnownDirectory::Logs)
            .join(format!(
                "{}-{}.log",
                stem,
                Local::now().format("%Y%m%d-%H%M%S")
            ));

        match std::fs::File::create(&log_path) {
            Ok(file) => match file.try_clone() {
                Ok(clone) => Some((log_path, file, clone)),
                Err(e) => {
                    self.trace.warning(&format!(
                        "Could not duplicate log handle for {:?}: {}",
                        log_path, e
                    ));
                    None
                }
            },
            Err(e) => {
                self.trace.warning(&format!(
                    "Could not create invocation log {:?}: {}",
                    log_path, e
                ));
                None
            }
        }
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    fn resolve(&self, name: &str, location: Option<&str>) -> Result<PathBuf, LaunchError> {
        let root = self.context.get_directory(WellKnownDirectory::Root);

        let path = match location {
            Some(location) => {
                let candidate = Path::new(location);
                if candidate.is_absolute() {
                    if candidate.extension().is_some() {
                        candidate.to_path_buf()
                    } else {
                        candidate.join(name)
                    }
                } else {
                    root.join(location).join(name)
                }
            }
            None => root.join(name),
        };

        if path.exists() {
            Ok(path)
        } else {
            Err(LaunchError::NotFound(path))
        }
    }

    async fn launch_and_wait(
        &self,
        path: &Path,
        capture_output: bool,
    ) -> Result<i32, LaunchError> {
        let mut child = self.launch(path, capture_output)?;

        let status = child.wait().await.map_err(|source| LaunchError::Spawn {
            path: path.to_path_buf(),
            source,
        })?;

        let exit_code = status.code().unwrap_or(-1);
        self.trace.info(&format!(
            "Process {:?} exited with code {}",
            path, exit_code
        ));
        Ok(exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn launcher_in(dir: &Path) -> ProcessLauncher {
        let context = HostContext::new();
        context.set_root_override(dir.to_path_buf());
        ProcessLauncher::new(context)
    }

    #[test]
    fn strategy_by_extension() {
        assert_eq!(
            LaunchStrategy::for_path(Path::new("run.bat")),
            LaunchStrategy::CommandScript
        );
        assert_eq!(
            LaunchStrategy::for_path(Path::new("RUN.CMD")),
            LaunchStrategy::CommandScript
        );
        assert_eq!(
            LaunchStrategy::for_path(Path::new("fix.ps1")),
            LaunchStrategy::PowerShellScript
        );
        assert_eq!(
            LaunchStrategy::for_path(Path::new("sync.sh")),
            LaunchStrategy::ShellScript
        );
        assert_eq!(
            LaunchStrategy::for_path(Path::new("valida_bkp.exe")),
            LaunchStrategy::Binary
        );
        assert_eq!(
            LaunchStrategy::for_path(Path::new("no_extension")),
            LaunchStrategy::Binary
        );
    }

    #[test]
    fn resolves_install_root_by_default() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("task.exe"), b"x").unwrap();
        let launcher = launcher_in(dir.path());

        let resolved = launcher.resolve("task.exe", None).unwrap();
        assert_eq!(resolved, dir.path().join("task.exe"));
    }

    #[test]
    fn resolves_relative_directory_under_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("tools")).unwrap();
        fs::write(dir.path().join("tools").join("task.exe"), b"x").unwrap();
        let launcher = launcher_in(dir.path());

        let resolved = launcher.resolve("task.exe", Some("tools")).unwrap();
        assert_eq!(resolved, dir.path().join("tools").join("task.exe"));
    }

    #[test]
    fn resolves_absolute_file_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("standalone.exe");
        fs::write(&file, b"x").unwrap();
        let launcher = launcher_in(dir.path());

        // Absolute path with an extension is taken as the file itself.
        let resolved = launcher
            .resolve("ignored.exe", Some(file.to_str().unwrap()))
            .unwrap();
        assert_eq!(resolved, file);

        // Absolute path without an extension is a directory.
        let resolved = launcher
            .resolve("standalone.exe", Some(dir.path().to_str().unwrap()))
            .unwrap();
        assert_eq!(resolved, file);
    }

    #[test]
    fn missing_executable_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = launcher_in(dir.path());

        match launcher.resolve("ghost.exe", None) {
            Err(LaunchError::NotFound(path)) => {
                assert_eq!(path, dir.path().join("ghost.exe"));
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_a_command_script_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("job.bat");
        fs::write(&script, "exit 0\n").unwrap();
        let launcher = launcher_in(dir.path());

        let code = launcher.launch_and_wait(&script, false).await.unwrap();
        assert_eq!(code, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_code_is_reported_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("job.bat");
        fs::write(&script, "exit 7\n").unwrap();
        let launcher = launcher_in(dir.path());

        let code = launcher.launch_and_wait(&script, false).await.unwrap();
        assert_eq!(code, 7);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unspawnable_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("data.bin");
        fs::write(&binary, b"not executable").unwrap();
        let launcher = launcher_in(dir.path());

        match launcher.launch_and_wait(&binary, false).await {
            Err(LaunchError::Spawn { path, .. }) => assert_eq!(path, binary),
            other => panic!("expected Spawn error, got {:?}", other),
        }
    }
}
