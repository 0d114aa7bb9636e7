//! 設定 (archfleet.kdl) のレシピに基づくソース解決
//!
//! バージョン → ref の対応:
//! - `latest` はコンポーネントごとの移動 ref (`latest "main"`)
//! - `alias` に登録されたバージョンはその ref
//! - それ以外は `"v" + version`

use crate::cache::{ArchiveCache, extract_archive};
use crate::error::{Result, SourceError};
use crate::fetch::ArchiveFetcher;
use crate::provider::SourceProvider;
use crate::revision::{Checkout, ComponentRevision, LOCAL_REVISION, SourceRevision};
use crate::sync::sync_tree;
use archfleet_config::{ComponentRecipe, FetchStrategy, ImageRecipe};
use archfleet_core::Git;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 作業チェックアウトのディレクトリ名 (イメージディレクトリ直下)
pub const WORK_DIR: &str = ".src";

/// キャッシュのデフォルトディレクトリ名 (イメージディレクトリ直下)
pub const CACHE_DIR: &str = ".cache";

pub struct RecipeSource {
    recipe: ImageRecipe,
    image_dir: PathBuf,
    cache: ArchiveCache,
    git: Arc<dyn Git>,
    fetcher: Arc<dyn ArchiveFetcher>,
    /// component名 → ローカルソース
    overrides: HashMap<String, PathBuf>,
}

impl RecipeSource {
    pub fn new(
        recipe: ImageRecipe,
        image_dir: PathBuf,
        cache_dir: Option<PathBuf>,
        git: Arc<dyn Git>,
        fetcher: Arc<dyn ArchiveFetcher>,
    ) -> Self {
        let cache = ArchiveCache::new(cache_dir.unwrap_or_else(|| image_dir.join(CACHE_DIR)));
        Self {
            recipe,
            image_dir,
            cache,
            git,
            fetcher,
            overrides: HashMap::new(),
        }
    }

    /// `override-env` に指定された環境変数を読み込む
    pub fn with_env_overrides(mut self) -> Self {
        for component in &self.recipe.components {
            let Some(var) = &component.override_env else {
                continue;
            };
            if let Some(path) = std::env::var_os(var).filter(|v| !v.is_empty()) {
                tracing::info!(
                    "{} is set; using local source for {}/{}",
                    var,
                    self.recipe.name,
                    component.name
                );
                self.overrides
                    .insert(component.name.clone(), PathBuf::from(path));
            }
        }
        self
    }

    /// コンポーネントのソースをローカルパスに差し替える
    pub fn with_override(mut self, component: &str, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(component.to_string(), path.into());
        self
    }

    pub fn work_dir(&self) -> PathBuf {
        self.image_dir.join(WORK_DIR)
    }

    /// コンポーネントの展開先
    ///
    /// 単一コンポーネントのイメージは作業ディレクトリ直下に展開する。
    fn component_dir(&self, component: &str) -> PathBuf {
        if self.recipe.components.len() == 1 {
            self.work_dir()
        } else {
            self.work_dir().join(component)
        }
    }

    fn component(&self, name: &str) -> Option<&ComponentRecipe> {
        self.recipe.components.iter().find(|c| c.name == name)
    }

    async fn materialize_component(
        &self,
        recipe: &ComponentRecipe,
        revision: &ComponentRevision,
    ) -> Result<()> {
        let dest = self.component_dir(&revision.component);

        if let Some(local) = &revision.local {
            let (local, dest) = (local.clone(), dest.clone());
            tokio::task::spawn_blocking(move || sync_tree(&local, &dest))
                .await
                .map_err(|e| std::io::Error::other(e.to_string()))??;
            return Ok(());
        }

        match recipe.fetch {
            FetchStrategy::Archive => {
                let url = recipe.archive_url(&revision.revision);
                let archive = self
                    .cache
                    .ensure(&revision.revision, &url, self.fetcher.as_ref())
                    .await?;
                tokio::task::spawn_blocking(move || extract_archive(&archive, &dest))
                    .await
                    .map_err(|e| std::io::Error::other(e.to_string()))??;
            }
            FetchStrategy::Git => {
                self.checkout_repo(&recipe.repo, &dest, &revision.revision)
                    .await?;
            }
        }

        Ok(())
    }

    async fn checkout_repo(&self, url: &str, dest: &Path, revision: &str) -> Result<()> {
        if dest.join(".git").is_dir() {
            self.git.fetch(dest).await?;
        } else {
            if dest.exists() {
                tokio::fs::remove_dir_all(dest).await?;
            }
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            self.git.clone_repo(url, dest).await?;
        }
        self.git.checkout(dest, revision).await?;
        Ok(())
    }
}

/// バージョン文字列をコンポーネントの ref に変換
pub fn resolve_ref(component: &ComponentRecipe, version: &str) -> String {
    if version == archfleet_core::DEFAULT_TAG {
        return component.latest.clone();
    }
    if let Some(reference) = component.aliases.get(version) {
        return reference.clone();
    }
    format!("v{}", version)
}

#[async_trait]
impl SourceProvider for RecipeSource {
    async fn resolve(&self, version: &str) -> Result<SourceRevision> {
        let mut components = Vec::with_capacity(self.recipe.components.len());

        for component in &self.recipe.components {
            let reference = resolve_ref(component, version);

            if let Some(local) = self.overrides.get(&component.name) {
                components.push(ComponentRevision {
                    component: component.name.clone(),
                    reference,
                    revision: LOCAL_REVISION.to_string(),
                    local: Some(local.clone()),
                });
                continue;
            }

            tracing::info!("Inspecting reference {} of {}", reference, component.repo);
            let remote = self
                .git
                .ls_remote(&component.repo, &reference)
                .await?
                .ok_or_else(|| SourceError::RefNotFound {
                    url: component.repo.clone(),
                    reference: reference.clone(),
                })?;
            tracing::debug!("{} -> {} ({})", reference, remote.revision, remote.full_ref);

            components.push(ComponentRevision {
                component: component.name.clone(),
                reference,
                revision: remote.revision,
                local: None,
            });
        }

        Ok(SourceRevision::new(&self.recipe.name, version, components))
    }

    async fn materialize(&self, revision: &SourceRevision) -> Result<Checkout> {
        for component_rev in &revision.components {
            let recipe = self
                .component(&component_rev.component)
                .ok_or_else(|| SourceError::UnknownImage(revision.image.clone()))?;
            self.materialize_component(recipe, component_rev).await?;
        }

        Ok(Checkout {
            path: self.work_dir(),
            build_args: revision.build_args(),
        })
    }
}
