//! 実行ホストの状態
//!
//! プラットフォーム、現在のブランチ、作業ツリーの dirty フラグは
//! 起動時に一度だけ計算し、各コンポーネントへ明示的に渡す。

use crate::error::Result;
use crate::git::Git;
use crate::model::{ImageSpec, PlatformId};
use std::path::{Path, PathBuf};

/// detached HEAD で実行された場合のブランチ名
pub const DETACHED_BRANCH: &str = "detached";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostContext {
    pub project_dir: PathBuf,
    pub platform: PlatformId,
    pub branch: String,
    pub dirty: bool,
    pub mainline: String,
    pub remote: String,
}

impl HostContext {
    /// ホストを調べて HostContext を作成
    #[tracing::instrument(skip(git))]
    pub async fn detect(
        git: &dyn Git,
        project_dir: &Path,
        mainline: &str,
        remote: &str,
    ) -> Result<Self> {
        let platform = PlatformId::host()?;

        let mut branch = git.current_branch(project_dir).await?;
        if branch.is_empty() {
            tracing::warn!("HEAD is detached; tags will use the '{}' suffix", DETACHED_BRANCH);
            branch = DETACHED_BRANCH.to_string();
        }

        let dirty = git.is_dirty(project_dir).await?;

        tracing::debug!(%platform, %branch, dirty, "Detected host context");

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            platform,
            branch,
            dirty,
            mainline: mainline.to_string(),
            remote: remote.to_string(),
        })
    }

    pub fn is_mainline(&self) -> bool {
        self.branch == self.mainline
    }

    /// リモート追跡ブランチ名 (例: `origin/master`)
    pub fn mainline_ref(&self) -> String {
        format!("{}/{}", self.remote, self.mainline)
    }

    pub fn full_tag(&self, group: &str, image: &ImageSpec) -> String {
        image.full_tag(group, &self.branch, &self.mainline)
    }

    /// ネイティブ以外のプラットフォームはエミュレーション (buildx) が必要
    pub fn needs_emulation(&self, platform: &PlatformId) -> bool {
        *platform != self.platform
    }

    pub fn images_dir(&self) -> PathBuf {
        self.project_dir.join(crate::changes::IMAGES_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(branch: &str) -> HostContext {
        HostContext {
            project_dir: PathBuf::from("/work"),
            platform: PlatformId::linux("amd64"),
            branch: branch.to_string(),
            dirty: false,
            mainline: "master".to_string(),
            remote: "origin".to_string(),
        }
    }

    #[test]
    fn test_full_tag_uses_branch() {
        let image = ImageSpec::new("proxy", "latest");
        assert_eq!(host("master").full_tag("g", &image), "g/proxy:latest");
        assert_eq!(
            host("feature/x").full_tag("g", &image),
            "g/proxy:latest__feature-x"
        );
    }

    #[test]
    fn test_needs_emulation() {
        let h = host("master");
        assert!(!h.needs_emulation(&PlatformId::linux("amd64")));
        assert!(h.needs_emulation(&PlatformId::linux("arm64")));
    }

    #[test]
    fn test_mainline_ref() {
        assert_eq!(host("dev").mainline_ref(), "origin/master");
        assert!(host("master").is_mainline());
        assert!(!host("dev").is_mainline());
    }

    #[test]
    fn test_images_dir() {
        assert_eq!(host("master").images_dir(), PathBuf::from("/work/images"));
    }
}
