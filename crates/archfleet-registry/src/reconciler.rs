//! マニフェストリストの再構成
//!
//! 1. ビルドしたイメージを `<full_tag>__<arch>` としてタグ付けして push
//! 2. push で得たダイジェストをこのプラットフォームのエントリにする
//! 3. `<full_tag>` の現在のリストを取得 (push 後に取り直す)
//! 4. 既存リストを削除して新しいリストを公開
//!
//! ビルドしたプラットフォームのエントリは常に置き換え、それ以外は残す。
//! 3 以降で失敗しても、push 済みのアーキテクチャ別イメージは戻さない。

use crate::error::Result;
use crate::model::{ManifestEntry, ManifestList};
use crate::store::ManifestStore;
use crate::transaction::ManifestTransaction;
use archfleet_core::{KeyedLocks, PlatformId, arch_tag};
use async_trait::async_trait;
use std::sync::Arc;

/// アーキテクチャ修飾タグでの push
#[async_trait]
pub trait ArchPusher: Send + Sync {
    /// `source` を `target` としてタグ付けして push し、ダイジェストを返す
    async fn push_as(&self, source: &str, target: &str) -> Result<String>;
}

pub struct ManifestReconciler {
    store: Arc<dyn ManifestStore>,
    pusher: Arc<dyn ArchPusher>,
    /// 同じタグへの再構成は直列化する
    locks: KeyedLocks,
}

impl ManifestReconciler {
    pub fn new(store: Arc<dyn ManifestStore>, pusher: Arc<dyn ArchPusher>) -> Self {
        Self {
            store,
            pusher,
            locks: KeyedLocks::new(),
        }
    }

    /// `full_tag` のリストに `platform` 向けの新しいイメージを取り込む
    #[tracing::instrument(skip(self), fields(platform = %platform))]
    pub async fn reconcile(&self, full_tag: &str, platform: &PlatformId) -> Result<ManifestList> {
        let _guard = self.locks.lock(full_tag).await;

        let arch_tag = arch_tag(full_tag, platform);
        let digest = self.pusher.push_as(full_tag, &arch_tag).await?;
        tracing::info!("Pushed {} ({})", arch_tag, digest);

        let mut tx = ManifestTransaction::begin(self.store.as_ref(), full_tag).await;
        tx.put(ManifestEntry::new(platform.clone(), digest));

        tracing::info!(
            "Updating manifest list {} ({} -> {} entries)",
            full_tag,
            tx.base().len(),
            tx.next().len()
        );

        let published = tx.commit(self.store.as_ref()).await.inspect_err(|e| {
            tracing::error!(
                "Manifest list {} was not updated; {} remains pushed: {}",
                full_tag,
                arch_tag,
                e
            );
        })?;

        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// バージョン付きのインメモリストア
    #[derive(Default)]
    struct MemoryStore {
        lists: Mutex<HashMap<String, (ManifestList, usize)>>,
        fail_publish: bool,
        replaced: AtomicUsize,
    }

    impl MemoryStore {
        fn seed(&self, list: ManifestList) {
            self.lists
                .lock()
                .unwrap()
                .insert(list.repo_tag.clone(), (list, 1));
        }

        fn current(&self, repo_tag: &str) -> Option<ManifestList> {
            self.lists
                .lock()
                .unwrap()
                .get(repo_tag)
                .map(|(list, _)| list.clone())
        }

        /// 他の書き込みを模擬する
        fn bump(&self, repo_tag: &str) {
            if let Some((_, version)) = self.lists.lock().unwrap().get_mut(repo_tag) {
                *version += 1;
            }
        }
    }

    #[async_trait]
    impl ManifestStore for MemoryStore {
        async fn fetch(&self, repo_tag: &str) -> ManifestList {
            match self.lists.lock().unwrap().get(repo_tag) {
                Some((list, version)) => {
                    let mut list = list.clone();
                    list.version = Some(version.to_string());
                    list
                }
                None => ManifestList::empty(repo_tag),
            }
        }

        async fn replace(&self, expected: &ManifestList, next: &ManifestList) -> Result<()> {
            if self.fail_publish {
                return Err(RegistryError::ManifestPublish {
                    repo_tag: next.repo_tag.clone(),
                    message: "denied".to_string(),
                });
            }
            let mut lists = self.lists.lock().unwrap();
            let current_version = lists.get(&next.repo_tag).map(|(_, v)| v.to_string());
            if current_version != expected.version {
                return Err(RegistryError::Conflict(next.repo_tag.clone()));
            }
            let version = lists.get(&next.repo_tag).map(|(_, v)| v + 1).unwrap_or(1);
            lists.insert(next.repo_tag.clone(), (next.clone(), version));
            self.replaced.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// 固定のダイジェストを返す pusher
    struct StubPusher {
        digest: String,
        pushed: Mutex<Vec<(String, String)>>,
    }

    impl StubPusher {
        fn new(digest: &str) -> Self {
            Self {
                digest: digest.to_string(),
                pushed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ArchPusher for StubPusher {
        async fn push_as(&self, source: &str, target: &str) -> Result<String> {
            self.pushed
                .lock()
                .unwrap()
                .push((source.to_string(), target.to_string()));
            Ok(self.digest.clone())
        }
    }

    const TAG: &str = "group/proxy:latest";

    fn amd64() -> PlatformId {
        PlatformId::linux("amd64")
    }

    fn arm64() -> PlatformId {
        PlatformId::linux("arm64")
    }

    fn reconciler(store: &Arc<MemoryStore>, digest: &str) -> (ManifestReconciler, Arc<StubPusher>) {
        let pusher = Arc::new(StubPusher::new(digest));
        (ManifestReconciler::new(store.clone(), pusher.clone()), pusher)
    }

    #[tokio::test]
    async fn test_rebuild_replaces_only_built_platform() {
        let store = Arc::new(MemoryStore::default());
        store.seed(ManifestList::from_entries(
            TAG,
            [
                ManifestEntry::new(amd64(), "D1"),
                ManifestEntry::new(arm64(), "D2"),
            ],
        ));
        let (reconciler, pusher) = reconciler(&store, "D3");

        let published = reconciler.reconcile(TAG, &arm64()).await.unwrap();

        assert_eq!(published.digest(&amd64()), Some("D1"));
        assert_eq!(published.digest(&arm64()), Some("D3"));
        assert_eq!(published.len(), 2);
        assert_eq!(store.current(TAG).unwrap().mapping(), published.mapping());
        assert_eq!(
            *pusher.pushed.lock().unwrap(),
            vec![(TAG.to_string(), "group/proxy:latest__arm64".to_string())]
        );
    }

    #[tokio::test]
    async fn test_first_publish_without_prior_list() {
        let store = Arc::new(MemoryStore::default());
        let (reconciler, _) = reconciler(&store, "D4");

        let published = reconciler.reconcile(TAG, &amd64()).await.unwrap();

        assert_eq!(published.len(), 1);
        assert_eq!(published.digest(&amd64()), Some("D4"));
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let store = Arc::new(MemoryStore::default());
        store.seed(ManifestList::from_entries(
            TAG,
            [ManifestEntry::new(arm64(), "D2")],
        ));
        let (reconciler, _) = reconciler(&store, "D5");

        let once = reconciler.reconcile(TAG, &amd64()).await.unwrap();
        let twice = reconciler.reconcile(TAG, &amd64()).await.unwrap();

        assert_eq!(once.mapping(), twice.mapping());
        assert_eq!(store.replaced.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_publish_failure_is_reported() {
        let store = Arc::new(MemoryStore {
            fail_publish: true,
            ..Default::default()
        });
        store.seed(ManifestList::from_entries(
            TAG,
            [ManifestEntry::new(amd64(), "D1")],
        ));
        let (reconciler, pusher) = reconciler(&store, "D2");

        let err = reconciler.reconcile(TAG, &arm64()).await.unwrap_err();

        assert!(matches!(err, RegistryError::ManifestPublish { .. }));
        // push 済みのアーキテクチャ別イメージはそのまま
        assert_eq!(pusher.pushed.lock().unwrap().len(), 1);
        assert_eq!(store.current(TAG).unwrap().digest(&amd64()), Some("D1"));
        assert_eq!(store.current(TAG).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transaction_detects_concurrent_writer() {
        let store = Arc::new(MemoryStore::default());
        store.seed(ManifestList::from_entries(
            TAG,
            [ManifestEntry::new(amd64(), "D1")],
        ));

        let mut tx = ManifestTransaction::begin(store.as_ref(), TAG).await;
        tx.put(ManifestEntry::new(arm64(), "D2"));
        store.bump(TAG);

        let err = tx.commit(store.as_ref()).await.unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_concurrent_reconciles_keep_both_platforms() {
        let store = Arc::new(MemoryStore::default());
        let (reconciler, _) = reconciler(&store, "DX");
        let reconciler = Arc::new(reconciler);

        let a = {
            let r = reconciler.clone();
            tokio::spawn(async move { r.reconcile(TAG, &amd64()).await })
        };
        let b = {
            let r = reconciler.clone();
            tokio::spawn(async move { r.reconcile(TAG, &arm64()).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let current = store.current(TAG).unwrap();
        assert_eq!(current.len(), 2);
        assert_eq!(current.digest(&amd64()), Some("DX"));
        assert_eq!(current.digest(&arm64()), Some("DX"));
    }
}
