// Fetches the remote schedule document, defeating intermediate caches, and
// falls back to the last successfully cached document when the network or
// the document is broken. A fetch failure is never fatal; at worst the
// caller skips the tick.

use crate::schedule::ScheduleConfig;

use bkpmon_common::constants::{defaults, WellKnownFile};
use bkpmon_common::host_context::HostContext;
use bkpmon_common::http_client_factory::HttpClientFactory;
use bkpmon_common::tracing::Tracing;

use anyhow::{Context, Result};
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;

/// The result of a config fetch.
pub enum FetchOutcome {
    /// A document freshly fetched from the remote endpoint.
    Fresh(ScheduleConfig),
    /// The remote fetch failed; this is the last cached document.
    Cached(ScheduleConfig),
    /// Neither the remote endpoint nor the cache produced a document.
    Unavailable,
}

/// Fetches and caches the remote schedule document.
pub struct ConfigFetcher {
    trace: Tracing,
    url: String,
    cache_path: PathBuf,
    timeout: std::time::Duration,
}

impl ConfigFetcher {
    pub fn new(context: &Arc<HostContext>, url: String) -> Self {
        Self {
            trace: context.get_trace("ConfigFetcher"),
            url,
            cache_path: context.get_file(WellKnownFile::ConfigCache),
            timeout: defaults::CONFIG_FETCH_TIMEOUT,
        }
    }

    /// Fetch the schedule document.
    ///
    /// On success the raw bytes are written to the cache file and the parsed
    /// document is returned as `Fresh`. On any remote failure (network,
    /// HTTP status, parse) the cache file is tried; when that also fails the
    /// outcome is `Unavailable`.
    pub async fn fetch(&self) -> FetchOutcome {
        match self.fetch_remote().await {
            Ok(bytes) => match ScheduleConfig::parse(&bytes) {
                Ok(config) => {
                    self.trace.verbose(&format!(
                        "Config fetched; remote version {}",
                        config.version
                    ));
                    if let Err(e) = std::fs::write(&self.cache_path, &bytes) {
                        self.trace.warning(&format!(
                            "Could not write config cache {:?}: {}",
                            self.cache_path, e
                        ));
                    }
                    FetchOutcome::Fresh(config)
                }
                Err(e) => {
                    self.trace
                        .warning(&format!("Remote config is malformed: {}", e));
                    self.load_cached()
                }
            },
            Err(e) => {
                self.trace
                    .warning(&format!("Config fetch failed: {:#}", e));
                self.load_cached()
            }
        }
    }

    /// GET the document with a cache-defeating query parameter.
    async fn fetch_remote(&self) -> Result<Vec<u8>> {
        let mut url = url::Url::parse(&self.url)
            .with_context(|| format!("Invalid config URL '{}'", self.url))?;

        let nocache: u32 = rand::thread_rng().gen_range(1000..=999_999);
        url.query_pairs_mut()
            .append_pair("nocache", &nocache.to_string());

        let client = HttpClientFactory::create_client(self.timeout)?;
        let response = client
            .get(url)
            .send()
            .await
            .context("Config request failed")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Config fetch returned HTTP {}",
                response.status().as_u16()
            );
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read config response body")?;

        Ok(bytes.to_vec())
    }

    /// Load and parse the last cached document.
    fn load_cached(&self) -> FetchOutcome {
        match std::fs::read(&self.cache_path) {
            Ok(bytes) => match ScheduleConfig::parse(&bytes) {
                Ok(config) => {
                    self.trace.info(&format!(
                        "Using cached config from {:?} (version {})",
                        self.cache_path, config.version
                    ));
                    FetchOutcome::Cached(config)
                }
                Err(e) => {
                    self.trace.warning(&format!(
                        "Config cache {:?} is malformed: {}",
                        self.cache_path, e
                    ));
                    FetchOutcome::Unavailable
                }
            },
            Err(_) => {
                self.trace.warning("No config cache available");
                FetchOutcome::Unavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher_in(dir: &std::path::Path, url: &str) -> ConfigFetcher {
        let context = HostContext::new();
        context.set_root_override(dir.to_path_buf());
        ConfigFetcher::new(&context, url.to_string())
    }

    #[tokio::test]
    async fn falls_back_to_cache_when_remote_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config_cache.json"),
            r#"{"versao": "1.0.0", "executar": [{"nome": "a.exe", "horario": "12:00"}]}"#,
        )
        .unwrap();

        let fetcher = fetcher_in(dir.path(), "http://127.0.0.1:9/config.json");
        match fetcher.fetch().await {
            FetchOutcome::Cached(config) => {
                assert_eq!(config.version, "1.0.0");
                assert_eq!(config.tasks.len(), 1);
            }
            FetchOutcome::Fresh(_) => panic!("unreachable endpoint produced a fresh config"),
            FetchOutcome::Unavailable => panic!("cache was not used"),
        }
    }

    #[tokio::test]
    async fn unavailable_when_no_cache_exists() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher_in(dir.path(), "http://127.0.0.1:9/config.json");

        assert!(matches!(fetcher.fetch().await, FetchOutcome::Unavailable));
    }

    #[tokio::test]
    async fn malformed_cache_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config_cache.json"), "{{{{").unwrap();

        let fetcher = fetcher_in(dir.path(), "http://127.0.0.1:9/config.json");
        assert!(matches!(fetcher.fetch().await, FetchOutcome::Unavailable));
    }
}
