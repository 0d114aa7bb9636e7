//! upstream ソースの解決と取得
//!
//! イメージ名とバージョンから、再現可能なソーススナップショット
//! ([`SourceRevision`]) を解決し、ローカルディスクに展開する。
//! イメージごとの実装は [`SourceRegistry`] に登録して名前で引く。

pub mod cache;
pub mod error;
pub mod fetch;
pub mod provider;
pub mod recipe;
pub mod registry;
pub mod revision;
pub mod sync;

pub use cache::{ArchiveCache, extract_archive};
pub use error::{Result, SourceError};
pub use fetch::{ArchiveFetcher, HttpFetcher};
pub use provider::SourceProvider;
pub use recipe::RecipeSource;
pub use registry::SourceRegistry;
pub use revision::{Checkout, ComponentRevision, SourceRevision};
pub use sync::{SyncStats, sync_tree};
