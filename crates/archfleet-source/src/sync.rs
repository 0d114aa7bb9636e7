//! ローカルソースの一方向同期
//!
//! override されたコンポーネントのローカルツリーを作業チェックアウトへ反映する。
//! サイズか更新時刻が異なるファイルだけをコピーし、宛先側のファイルは削除しない。

use crate::error::Result;
use std::fs;
use std::path::Path;

/// 同期対象から外す名前 (ディレクトリでもファイルでも)
pub const SYNC_EXCLUDES: [&str; 2] = [".git", ".idea"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub copied: usize,
    pub unchanged: usize,
}

pub fn sync_tree(src: &Path, dest: &Path) -> Result<SyncStats> {
    tracing::info!("Syncing {} -> {}", src.display(), dest.display());
    let mut stats = SyncStats::default();
    sync_dir(src, dest, &mut stats)?;
    tracing::debug!(copied = stats.copied, unchanged = stats.unchanged, "Sync finished");
    Ok(stats)
}

fn sync_dir(src: &Path, dest: &Path, stats: &mut SyncStats) -> Result<()> {
    fs::create_dir_all(dest)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if SYNC_EXCLUDES.iter().any(|ex| name == *ex) {
            continue;
        }
        let from = entry.path();
        let to = dest.join(&name);
        let metadata = fs::metadata(&from)?;

        if metadata.is_dir() {
            sync_dir(&from, &to, stats)?;
            continue;
        }

        if is_unchanged(&metadata, &to) {
            stats.unchanged += 1;
            continue;
        }

        fs::copy(&from, &to)?;
        // 次回の比較のため更新時刻を揃える
        if let Ok(modified) = metadata.modified() {
            fs::File::options()
                .write(true)
                .open(&to)?
                .set_modified(modified)?;
        }
        stats.copied += 1;
    }

    Ok(())
}

fn is_unchanged(src: &fs::Metadata, dest: &Path) -> bool {
    let Ok(existing) = fs::metadata(dest) else {
        return false;
    };
    match (src.modified(), existing.modified()) {
        (Ok(a), Ok(b)) => src.len() == existing.len() && a == b,
        _ => false,
    }
}
