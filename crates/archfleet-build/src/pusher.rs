//! アーキテクチャ修飾タグでの push
//!
//! ビルド済みイメージに `<full_tag>__<arch>` のタグを付けて push し、
//! レジストリが返したダイジェストをマニフェストリストの再構成に渡す。

use crate::auth::RegistryAuth;
use crate::builder::DockerEngine;
use crate::error::{BuildError, Result};
use archfleet_core::split_image_tag;
use archfleet_registry::{ArchPusher, RegistryError};
use async_trait::async_trait;
use futures_util::StreamExt;
use regex::Regex;
use std::sync::LazyLock;

/// push 完了時のステータス行 (`<tag>: digest: <digest> size: <n>`)
static PUSHED_DIGEST: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(.*): digest: (\S+) size: (\d+)$").ok());

pub struct ImagePusher {
    engine: DockerEngine,
    auth: RegistryAuth,
}

impl ImagePusher {
    pub fn new(engine: DockerEngine) -> Self {
        Self {
            engine,
            auth: RegistryAuth::from_env(),
        }
    }

    pub fn with_auth(engine: DockerEngine, auth: RegistryAuth) -> Self {
        Self { engine, auth }
    }

    /// `source` に `target` のタグを付ける
    pub async fn tag(&self, source: &str, target: &str) -> Result<()> {
        let (repo, tag) = split_image_tag(target);
        validate_tag(tag)?;

        #[allow(deprecated)]
        let options = bollard::image::TagImageOptions {
            repo: repo.to_string(),
            tag: tag.to_string(),
        };
        self.engine.docker.tag_image(source, Some(options)).await?;
        Ok(())
    }

    /// `image` を push してダイジェストを返す
    pub async fn push(&self, image: &str) -> Result<String> {
        let (repo, tag) = split_image_tag(image);
        validate_tag(tag)?;

        let credentials = self.auth.credentials_for(image)?;

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> {
            tag: tag.to_string(),
        };

        tracing::info!("Pushing {}", image);

        #[allow(deprecated)]
        let mut stream = self.engine.docker.push_image(repo, Some(options), credentials);

        let mut digest = None;
        while let Some(result) = stream.next().await {
            let info = result.map_err(|e| BuildError::PushFailed {
                tag: image.to_string(),
                message: e.to_string(),
            })?;
            if let Some(message) = info.error {
                return Err(BuildError::PushFailed {
                    tag: image.to_string(),
                    message,
                });
            }
            if let Some(status) = info.status.as_deref() {
                match parse_pushed_digest(status) {
                    Some(found) => digest = Some(found),
                    None => tracing::trace!("{}", status),
                }
            }
        }

        match digest {
            Some(digest) => Ok(digest),
            None => self.repo_digest(image, repo).await,
        }
    }

    pub async fn tag_and_push(&self, source: &str, target: &str) -> Result<String> {
        self.tag(source, target).await?;
        self.push(target).await
    }

    /// ステータス行にダイジェストが無かった場合はイメージの RepoDigests から引く
    async fn repo_digest(&self, image: &str, repo: &str) -> Result<String> {
        let inspect = self.engine.docker.inspect_image(image).await?;
        let prefix = format!("{}@", repo);
        inspect
            .repo_digests
            .unwrap_or_default()
            .into_iter()
            .find_map(|d| d.strip_prefix(&prefix).map(str::to_string))
            .ok_or_else(|| BuildError::DigestNotFound(image.to_string()))
    }
}

#[async_trait]
impl ArchPusher for ImagePusher {
    async fn push_as(&self, source: &str, target: &str) -> archfleet_registry::Result<String> {
        self.tag_and_push(source, target)
            .await
            .map_err(|e| RegistryError::Push {
                tag: target.to_string(),
                message: e.to_string(),
            })
    }
}

/// push ストリームのステータス行からダイジェストを取り出す
pub fn parse_pushed_digest(status: &str) -> Option<String> {
    PUSHED_DIGEST
        .as_ref()?
        .captures(status.trim())
        .map(|caps| caps[2].to_string())
}

/// Docker タグの制約
///
/// - 128文字以下
/// - 英数字、ピリオド、ハイフン、アンダースコアのみ
/// - 先頭はピリオドまたはハイフンではない
pub fn validate_tag(tag: &str) -> Result<()> {
    let invalid = |reason: String| Err(BuildError::InvalidTag { tag: reason });

    if tag.is_empty() {
        return invalid("(empty)".to_string());
    }
    if tag.len() > 128 {
        return invalid(format!("{} ({} characters, max 128)", tag, tag.len()));
    }
    if tag.starts_with('.') || tag.starts_with('-') {
        return invalid(tag.to_string());
    }
    if let Some(c) = tag
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '-' | '_'))
    {
        return invalid(format!("{} (invalid character '{}')", tag, c));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pushed_digest() {
        let status = "latest__arm64: digest: sha256:0123abcd size: 1573";
        assert_eq!(
            parse_pushed_digest(status).as_deref(),
            Some("sha256:0123abcd")
        );
        assert_eq!(parse_pushed_digest("Pushed"), None);
        assert_eq!(parse_pushed_digest("Layer already exists"), None);
    }

    #[test]
    fn test_validate_tag_accepts_arch_tags() {
        assert!(validate_tag("latest").is_ok());
        assert!(validate_tag("latest__arm64").is_ok());
        assert!(validate_tag("1.0.0__feature-x__amd64").is_ok());
    }

    #[test]
    fn test_validate_tag_rejects() {
        assert!(validate_tag("").is_err());
        assert!(validate_tag("-latest").is_err());
        assert!(validate_tag(".latest").is_err());
        assert!(validate_tag("feature/x").is_err());
        assert!(validate_tag(&"a".repeat(129)).is_err());
    }
}
