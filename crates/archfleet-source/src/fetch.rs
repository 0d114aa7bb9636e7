//! ソースアーカイブのダウンロード

use crate::error::{Result, SourceError};
use async_trait::async_trait;
use std::path::Path;
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// `url` の内容を `dest` に書き込む
    async fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// HTTP(S) でアーカイブを取得する
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArchiveFetcher for HttpFetcher {
    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let download_err = |message: String| SourceError::Download {
            url: url.to_string(),
            message,
        };

        tracing::info!("Downloading {}", url);

        let mut response = self
            .client
            .get(url)
            .header("User-Agent", "archfleet")
            .send()
            .await
            .map_err(|e| download_err(e.to_string()))?;

        if !response.status().is_success() {
            return Err(download_err(format!("HTTP {}", response.status())));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| download_err(e.to_string()))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }
}
