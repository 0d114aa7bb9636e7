//! revision ごとのアーカイブキャッシュ
//!
//! キャッシュディレクトリには `<revision>.tar.gz` を1つずつ置く。
//! キャッシュの削除は手動で行う。

use crate::error::{Result, SourceError};
use crate::fetch::ArchiveFetcher;
use flate2::read::GzDecoder;
use std::fs::File;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ArchiveCache {
    dir: PathBuf,
}

impl ArchiveCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, revision: &str) -> PathBuf {
        self.dir.join(format!("{}.tar.gz", revision))
    }

    /// キャッシュにあればそのパスを、無ければダウンロードして返す
    pub async fn ensure(
        &self,
        revision: &str,
        url: &str,
        fetcher: &dyn ArchiveFetcher,
    ) -> Result<PathBuf> {
        let path = self.path_for(revision);
        if path.is_file() {
            tracing::debug!("Cache hit: {}", path.display());
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.dir).await?;

        // 途中で失敗してもキャッシュエントリとして残らないよう一時ファイルに書く
        let partial = self.dir.join(format!("{}.tar.gz.part", revision));
        if let Err(e) = fetcher.download(url, &partial).await {
            tokio::fs::remove_file(&partial).await.ok();
            return Err(e);
        }
        tokio::fs::rename(&partial, &path).await?;

        Ok(path)
    }
}

/// アーカイブを `dest` に展開する (先頭のディレクトリは取り除く)
///
/// `dest` は事前に削除され、常に1つのアーカイブの内容だけになる。
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let extract_err = |message: String| SourceError::Extract {
        path: archive.to_path_buf(),
        message,
    };

    tracing::info!("Extracting {}", archive.display());

    if dest.exists() {
        std::fs::remove_dir_all(dest)?;
    }
    std::fs::create_dir_all(dest)?;

    let mut tar = tar::Archive::new(GzDecoder::new(File::open(archive)?));
    for entry in tar.entries().map_err(|e| extract_err(e.to_string()))? {
        let mut entry = entry.map_err(|e| extract_err(e.to_string()))?;
        let path = entry
            .path()
            .map_err(|e| extract_err(e.to_string()))?
            .into_owned();

        let mut stripped = PathBuf::new();
        for component in path.components().skip(1) {
            match component {
                Component::Normal(part) => stripped.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(extract_err(format!(
                        "unsafe path in archive: {}",
                        path.display()
                    )));
                }
            }
        }
        if stripped.as_os_str().is_empty() {
            continue;
        }

        let target = dest.join(&stripped);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry
            .unpack(&target)
            .map_err(|e| extract_err(e.to_string()))?;
    }

    Ok(())
}
