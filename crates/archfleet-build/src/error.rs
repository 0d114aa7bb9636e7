use archfleet_core::CoreError;
use archfleet_registry::RegistryError;
use archfleet_source::SourceError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Dockerfile not found: {0}")]
    DockerfileNotFound(PathBuf),

    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("Build failed for {tag}: {message}")]
    BuildFailed { tag: String, message: String },

    #[error("Push failed for {tag}: {message}")]
    PushFailed { tag: String, message: String },

    #[error("No digest reported after pushing {0}")]
    DigestNotFound(String),

    #[error("Invalid tag: {tag}")]
    InvalidTag { tag: String },

    #[error("Authentication failed for {registry}: {message}")]
    AuthFailed { registry: String, message: String },

    #[error("Build job panicked: {0}")]
    JobPanicked(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::DockerfileNotFound(path) => {
                format!(
                    "Dockerfileが見つかりません: {}\n\
                     \n\
                     images/<name>/Dockerfile を用意してください。",
                    path.display()
                )
            }
            BuildError::BuildFailed { tag, message } => {
                format!(
                    "ビルドに失敗しました ({}): {}\n\
                     \n\
                     Dockerfileの内容を確認してください。",
                    tag, message
                )
            }
            BuildError::Registry(RegistryError::ManifestPublish { repo_tag, message }) => {
                format!(
                    "マニフェストリスト {} を公開できませんでした: {}\n\
                     \n\
                     アーキテクチャ別のイメージは push 済みです。再実行すると取り込まれます。",
                    repo_tag, message
                )
            }
            _ => format!("{}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
