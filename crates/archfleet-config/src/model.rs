//! 設定データモデル

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_REGISTRY_URL: &str = "https://registry-1.docker.io";
pub const DEFAULT_AUTH_URL: &str = "https://auth.docker.io/token";
pub const DEFAULT_AUTH_SERVICE: &str = "registry.docker.io";
pub const DEFAULT_ARCHIVE_TEMPLATE: &str = "{repo}/archive/{revision}.tar.gz";

/// `archfleet.kdl` 全体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 設定ファイルのあるディレクトリ
    pub root: PathBuf,
    pub project: ProjectConfig,
    pub registry: RegistryConfig,
    /// image名 → ソースレシピ
    pub images: BTreeMap<String, ImageRecipe>,
}

impl Config {
    /// `cache-dir` を解決する。未指定の場合は `None` (イメージごとの `.cache`)
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.project.cache_dir.as_ref().map(|dir| {
            if dir.is_absolute() {
                dir.clone()
            } else {
                self.root.join(dir)
            }
        })
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn image_dir(&self, name: &str) -> PathBuf {
        self.images_dir().join(name)
    }

    pub fn with_root(mut self, root: &Path) -> Self {
        self.root = root.to_path_buf();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,

    /// Docker Hub のグループ (organization)
    pub group: String,

    /// イメージラベルのプレフィックス (例: "com.example")
    pub label_prefix: Option<String>,

    pub mainline: String,

    pub remote: String,

    /// 同時に実行するビルドジョブ数
    pub concurrency: usize,

    pub cache_dir: Option<PathBuf>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            group: String::new(),
            label_prefix: None,
            mainline: "master".to_string(),
            remote: "origin".to_string(),
            concurrency: 1,
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry API のベースURL
    pub url: String,

    /// トークン発行エンドポイント
    pub auth: String,

    /// トークン要求時の `service` パラメータ
    pub service: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REGISTRY_URL.to_string(),
            auth: DEFAULT_AUTH_URL.to_string(),
            service: DEFAULT_AUTH_SERVICE.to_string(),
        }
    }
}

/// イメージのソースレシピ (独立にバージョン管理された upstream の集合)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageRecipe {
    pub name: String,
    pub components: Vec<ComponentRecipe>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// revision ごとの tar.gz をキャッシュして展開
    #[default]
    Archive,
    /// clone してから checkout
    Git,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentRecipe {
    pub name: String,

    /// upstream リポジトリURL
    pub repo: String,

    /// `latest` に対応する移動 ref
    pub latest: String,

    /// バージョン → upstream ref (upstream のタグ名が異なる場合)
    pub aliases: BTreeMap<String, String>,

    pub fetch: FetchStrategy,

    /// アーカイブURLテンプレート (`{repo}`, `{revision}`)
    pub archive: Option<String>,

    /// 設定されている場合、この環境変数のパスをソースとして使う
    pub override_env: Option<String>,
}

impl ComponentRecipe {
    pub fn archive_url(&self, revision: &str) -> String {
        self.archive
            .as_deref()
            .unwrap_or(DEFAULT_ARCHIVE_TEMPLATE)
            .replace("{repo}", self.repo.trim_end_matches(".git"))
            .replace("{revision}", revision)
    }
}
