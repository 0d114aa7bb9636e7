//! イメージ名 → ソース解決実装の登録表

use crate::error::{Result, SourceError};
use crate::fetch::ArchiveFetcher;
use crate::provider::SourceProvider;
use crate::recipe::RecipeSource;
use archfleet_config::Config;
use archfleet_core::Git;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct SourceRegistry {
    providers: BTreeMap<String, Arc<dyn SourceProvider>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 設定ファイルの image レシピをすべて登録する
    pub fn from_config(
        config: &Config,
        git: Arc<dyn Git>,
        fetcher: Arc<dyn ArchiveFetcher>,
    ) -> Self {
        let mut registry = Self::new();
        let cache_dir = config.cache_dir();

        for (name, recipe) in &config.images {
            let source = RecipeSource::new(
                recipe.clone(),
                config.image_dir(name),
                cache_dir.clone(),
                git.clone(),
                fetcher.clone(),
            )
            .with_env_overrides();
            registry.register(name, Arc::new(source));
        }

        tracing::debug!("Registered {} source recipes", registry.providers.len());
        registry
    }

    pub fn register(&mut self, image: &str, provider: Arc<dyn SourceProvider>) {
        self.providers.insert(image.to_string(), provider);
    }

    pub fn get(&self, image: &str) -> Option<Arc<dyn SourceProvider>> {
        self.providers.get(image).cloned()
    }

    /// 登録が必須の場面で使う
    pub fn require(&self, image: &str) -> Result<Arc<dyn SourceProvider>> {
        self.get(image)
            .ok_or_else(|| SourceError::UnknownImage(image.to_string()))
    }

    pub fn images(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}
