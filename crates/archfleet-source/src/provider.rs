use crate::error::Result;
use crate::revision::{Checkout, SourceRevision};
use async_trait::async_trait;

/// イメージごとのソース解決
///
/// 実装は [`crate::SourceRegistry`] にイメージ名で登録する。
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// バージョン文字列を再現可能な revision に解決する
    async fn resolve(&self, version: &str) -> Result<SourceRevision>;

    /// 解決済み revision を作業チェックアウトに展開する
    async fn materialize(&self, revision: &SourceRevision) -> Result<Checkout>;
}
