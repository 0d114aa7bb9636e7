//! マニフェストリストの read-modify-write
//!
//! レジストリには「リストにプラットフォームを追加する」原子的な操作が無いため、
//! 取得 → 変更 → 置き換えを1つのトランザクションとして扱う。

use crate::error::Result;
use crate::model::{ManifestEntry, ManifestList};
use crate::store::ManifestStore;

#[derive(Debug, Clone)]
pub struct ManifestTransaction {
    base: ManifestList,
    next: ManifestList,
}

impl ManifestTransaction {
    /// 最新のマニフェストリストを取得して開始する
    pub async fn begin(store: &dyn ManifestStore, repo_tag: &str) -> Self {
        let base = store.fetch(repo_tag).await;
        Self::from_base(base)
    }

    pub fn from_base(base: ManifestList) -> Self {
        let mut next = base.clone();
        next.version = None;
        Self { base, next }
    }

    /// 取得時点のリスト
    pub fn base(&self) -> &ManifestList {
        &self.base
    }

    /// 公開予定のリスト
    pub fn next(&self) -> &ManifestList {
        &self.next
    }

    /// エントリを追加する。同じプラットフォームの既存エントリは置き換わる
    pub fn put(&mut self, entry: ManifestEntry) {
        if let Some(previous) = self.next.put(entry.clone()) {
            tracing::debug!(
                "Superseding {} entry {} with {}",
                entry.platform,
                previous,
                entry.digest
            );
        }
    }

    pub async fn commit(self, store: &dyn ManifestStore) -> Result<ManifestList> {
        store.replace(&self.base, &self.next).await?;
        Ok(self.next)
    }
}
