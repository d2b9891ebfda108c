//! Streaming product download with retry and archive extraction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::{DiasError, Result};

/// Downloads product archives and unpacks them in place.
pub struct Downloader {
    client: Client,
    max_retries: u32,
    initial_retry_delay: Duration,
    max_retry_delay: Duration,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            max_retries: 3,
            initial_retry_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(120),
        }
    }

    /// Download a zip archive from `url` and extract it next to `destination`.
    ///
    /// `destination` is the product path the extracted archive will occupy.
    /// Parent directories are created; transport failures are retried with
    /// exponential backoff; a non-success status fails the download loudly.
    pub async fn fetch_zip(&self, url: &str, destination: &Path) -> Result<()> {
        let parent = destination
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent).await?;

        let zip_path = PathBuf::from(format!("{}.zip", destination.display()));

        let mut retry_count = 0;
        let mut delay = self.initial_retry_delay;
        loop {
            match self.stream_to_file(url, &zip_path).await {
                Ok(()) => break,
                Err(e) => {
                    fs::remove_file(&zip_path).await.ok();
                    retry_count += 1;
                    if retry_count > self.max_retries {
                        return Err(e);
                    }
                    warn!(
                        error = %e,
                        retry = retry_count,
                        max_retries = self.max_retries,
                        delay_secs = delay.as_secs(),
                        "Download failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, self.max_retry_delay);
                }
            }
        }

        extract_archive(&zip_path, &parent).await?;
        fs::remove_file(&zip_path).await?;

        info!(path = %destination.display(), "Download complete");
        Ok(())
    }

    async fn stream_to_file(&self, url: &str, path: &Path) -> Result<()> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DiasError::Download(format!(
                "unexpected response {status}: {body}"
            )));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .await?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

/// Unpack a zip archive into a directory on the blocking pool.
async fn extract_archive(zip_path: &Path, target_dir: &Path) -> Result<()> {
    let zip_path = zip_path.to_path_buf();
    let target_dir = target_dir.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = std::fs::File::open(&zip_path)?;
        let mut archive = zip::ZipArchive::new(file)?;
        archive.extract(&target_dir)?;
        Ok(())
    })
    .await
    .map_err(|e| DiasError::Download(format!("extraction task failed: {e}")))?
}
