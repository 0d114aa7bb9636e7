//! レジストリ連携とマニフェストリストの再構成
//!
//! 新しくビルドした単一アーキテクチャのイメージを、既存のマルチプラットフォーム
//! マニフェストリストへ「プラットフォーム単位の置き換え」で取り込む。
//! 今回ビルドしなかったプラットフォームのエントリはそのまま残る。

pub mod client;
pub mod error;
pub mod model;
pub mod reconciler;
pub mod store;
pub mod transaction;

pub use client::{DockerManifestCli, RegistryClient};
pub use error::{RegistryError, Result};
pub use model::{MANIFEST_LIST_MEDIA_TYPE, ManifestEntry, ManifestList};
pub use reconciler::{ArchPusher, ManifestReconciler};
pub use store::ManifestStore;
pub use transaction::ManifestTransaction;
