// File distribution: download a file and atomically replace the destination.
// A crash mid-download must never leave a corrupt destination file, so the
// payload is staged in a temporary file in the destination directory and
// renamed over the target only after the full download succeeds.

use bkpmon_common::constants::defaults;
use bkpmon_common::host_context::HostContext;
use bkpmon_common::http_client_factory::HttpClientFactory;
use bkpmon_common::tracing::Tracing;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// The file-replacement seam consumed by the update flow.
#[async_trait]
pub trait Distributor: Send + Sync {
    /// Download `url` and atomically replace `dest` with it.
    ///
    /// Returns `true` when the destination was replaced.
    async fn download_and_replace(&self, url: &str, dest: &Path) -> Result<bool>;
}

/// Downloads over HTTP and swaps via temp-file + rename.
pub struct HttpDistributor {
    trace: Tracing,
    timeout: std::time::Duration,
}

impl HttpDistributor {
    pub fn new(context: &Arc<HostContext>) -> Self {
        Self {
            trace: context.get_trace("Distributor"),
            timeout: defaults::DOWNLOAD_TIMEOUT,
        }
    }
}

#[async_trait]
impl Distributor for HttpDistributor {
    async fn download_and_replace(&self, url: &str, dest: &Path) -> Result<bool> {
        let parent = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| std::path::PathBuf::from("."));

        std::fs::create_dir_all(&parent)
            .with_context(|| format!("Failed to create destination directory {:?}", parent))?;

        self.trace
            .info(&format!("Downloading {} -> {:?}", url, dest));

        let client = HttpClientFactory::create_client(self.timeout)?;
        let response = client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Download of {} failed with HTTP {}",
                url,
                response.status().as_u16()
            );
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read download response body")?;

        // Stage in the destination directory so the rename stays on one
        // filesystem.
        let mut staged = tempfile::NamedTempFile::new_in(&parent)
            .context("Failed to create staging file")?;
        staged
            .write_all(&bytes)
            .context("Failed to write staging file")?;
        staged.flush().context("Failed to flush staging file")?;

        // On Windows, rename does not replace an existing file; remove the
        // old one first, accepting the short gap.
        #[cfg(windows)]
        if dest.exists() {
            std::fs::remove_file(dest)
                .with_context(|| format!("Failed to remove old file {:?}", dest))?;
        }

        staged
            .persist(dest)
            .with_context(|| format!("Failed to move staged file over {:?}", dest))?;

        self.trace.info(&format!(
            "Replaced {:?} ({} bytes)",
            dest,
            bytes.len()
        ));

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_url_leaves_destination_intact() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("valida_bkp.exe");
        std::fs::write(&dest, b"current contents").unwrap();

        let context = HostContext::new();
        context.set_root_override(dir.path().to_path_buf());
        let distributor = HttpDistributor::new(&context);

        let result = distributor
            .download_and_replace("http://127.0.0.1:9/valida_bkp.exe", &dest)
            .await;

        assert!(result.is_err());
        assert_eq!(std::fs::read(&dest).unwrap(), b"current contents");
    }
}
