// The local version-state document (`versao.config`): the installed version,
// the host role, and optionally the site id.

use crate::constants::{defaults, WellKnownFile};
use crate::host_context::HostContext;
use crate::tracing::Tracing;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// The persisted local state of this terminal.
///
/// Wire names follow the fleet's legacy document format, which the external
/// status panel reads and edits in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionState {
    /// The installed software version (dot-separated numeric components).
    #[serde(rename = "versao")]
    pub version: String,

    /// The host role, e.g. `SERVIDOR` or `CX1`.
    #[serde(rename = "tipo")]
    pub role: String,

    /// The site (store) identifier, when configured.
    #[serde(rename = "filial", default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
}

impl Default for VersionState {
    fn default() -> Self {
        Self {
            version: defaults::VERSION.to_string(),
            role: defaults::HOST_ROLE.to_string(),
            site_id: None,
        }
    }
}

/// Loads and saves the version-state document.
///
/// The file is deliberately re-read on every access instead of cached: the
/// status panel mutates it from its own process, and each polling tick must
/// observe the latest role and version.
pub struct VersionStore {
    path: PathBuf,
    trace: Tracing,
}

impl VersionStore {
    /// Create a `VersionStore` bound to the context's version-state file.
    pub fn new(context: &Arc<HostContext>) -> Self {
        Self {
            path: context.get_file(WellKnownFile::VersionState),
            trace: context.get_trace("VersionStore"),
        }
    }

    /// The path of the underlying file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load the version state, creating the file with defaults when it is
    /// absent or unreadable.
    pub fn load_or_create(&self) -> VersionState {
        match fs::read_to_string(&self.path) {
            Ok(json) => match serde_json::from_str::<VersionState>(&json) {
                Ok(mut state) => {
                    state.version = state.version.trim().to_string();
                    state.role = state.role.trim().to_uppercase();
                    return state;
                }
                Err(e) => {
                    self.trace.warning(&format!(
                        "Version state {:?} is malformed ({}); recreating with defaults",
                        self.path, e
                    ));
                }
            },
            Err(_) => {
                self.trace.info(&format!(
                    "Version state {:?} not found; creating with defaults",
                    self.path
                ));
            }
        }

        let state = VersionState::default();
        if let Err(e) = self.save(&state) {
            self.trace.warning(&format!(
                "Could not create default version state: {:#}",
                e
            ));
        }
        state
    }

    /// Persist the version state.
    pub fn save(&self, state: &VersionState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write version state to {:?}", self.path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &std::path::Path) -> VersionStore {
        let context = HostContext::new();
        context.set_root_override(dir.to_path_buf());
        VersionStore::new(&context)
    }

    #[test]
    fn creates_defaults_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let state = store.load_or_create();
        assert_eq!(state.version, "0.0.0");
        assert_eq!(state.role, "CX1");
        assert!(store.path().exists());
    }

    #[test]
    fn roundtrips_and_normalizes_role() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store
            .save(&VersionState {
                version: "1.2.3".into(),
                role: "servidor".into(),
                site_id: Some("F042".into()),
            })
            .unwrap();

        let state = store.load_or_create();
        assert_eq!(state.version, "1.2.3");
        assert_eq!(state.role, "SERVIDOR");
        assert_eq!(state.site_id.as_deref(), Some("F042"));
    }

    #[test]
    fn recreates_defaults_on_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        fs::write(store.path(), "not json at all").unwrap();

        let state = store.load_or_create();
        assert_eq!(state, VersionState::default());

        // The file itself was rewritten with the defaults.
        let reloaded: VersionState =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(reloaded, VersionState::default());
    }
}
