use crate::error::Result;
use crate::model::ManifestList;
use async_trait::async_trait;

/// マニフェストリストの読み出しと置き換え
#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// 現在のマニフェストリストを取得する
    ///
    /// 存在しない・取得できない場合は空のリストを返す (初回公開は正常系)。
    async fn fetch(&self, repo_tag: &str) -> ManifestList;

    /// `expected` を取得した時点の状態から `next` へ置き換える
    ///
    /// 条件付き更新ができるストアは、`expected.version` と現在の状態が
    /// 異なる場合 [`crate::RegistryError::Conflict`] を返す。
    async fn replace(&self, expected: &ManifestList, next: &ManifestList) -> Result<()>;
}
