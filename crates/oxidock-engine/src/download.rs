//! RCSB structure download client.
//!
//! Every requested identifier is fetched as its own concurrent task
//! with no pooling bound: the identifier list is short and explicit,
//! unlike the potentially large cross-product fed to the batch runner.
//! All downloads are joined before the pipeline advances.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use oxidock_common::{OxidockError, Result};

const DOWNLOAD_BASE_URL: &str = "https://files.rcsb.org/download/";

#[derive(Debug, Clone)]
pub struct PdbDownloader {
    client: reqwest::Client,
}

impl PdbDownloader {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent("oxidock/0.1 (ensemble docking)")
            .build()?;
        Ok(Self { client })
    }

    /// Fetches one PDB entry into `dest_dir`. An existing file is kept
    /// unless `overwrite` is set; a non-success status is a transport
    /// error for this identifier only.
    pub async fn download(&self, pdb_id: &str, dest_dir: &Path, overwrite: bool) -> Result<PathBuf> {
        let dest = dest_dir.join(format!("{pdb_id}.pdb"));
        if dest.exists() && !overwrite {
            debug!(%pdb_id, "Structure already downloaded, skipping");
            return Ok(dest);
        }

        let url = format!("{DOWNLOAD_BASE_URL}{pdb_id}.pdb");
        debug!(%pdb_id, %url, "Downloading structure");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(OxidockError::Transport(format!(
                "failed to download {pdb_id}.pdb: HTTP {}",
                response.status()
            )));
        }
        let body = response.text().await?;
        tokio::fs::write(&dest, body).await?;
        debug!(%pdb_id, dest = %dest.display(), "Structure downloaded");
        Ok(dest)
    }

    /// Launches one download task per identifier and joins them all.
    /// Sibling downloads run to completion even when one fails; the
    /// first failure is then surfaced.
    pub async fn download_list(
        &self,
        pdb_ids: &[String],
        dest_dir: &Path,
        overwrite: bool,
    ) -> Result<()> {
        let mut tasks = JoinSet::new();
        for pdb_id in pdb_ids {
            let downloader = self.clone();
            let pdb_id = pdb_id.clone();
            let dest_dir = dest_dir.to_path_buf();
            tasks.spawn(async move { downloader.download(&pdb_id, &dest_dir, overwrite).await });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "Structure download failed");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    warn!(error = %e, "Download task panicked");
                    first_error.get_or_insert(OxidockError::Task(e.to_string()));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn existing_file_is_not_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1ABC.pdb");
        std::fs::write(&path, "HEADER    TEST").unwrap();

        // No network access happens for a present file.
        let downloader = PdbDownloader::new().unwrap();
        let dest = downloader.download("1ABC", dir.path(), false).await.unwrap();
        assert_eq!(dest, path);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "HEADER    TEST");
    }

    #[tokio::test]
    async fn empty_list_joins_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = PdbDownloader::new().unwrap();
        downloader.download_list(&[], dir.path(), false).await.unwrap();
    }
}
