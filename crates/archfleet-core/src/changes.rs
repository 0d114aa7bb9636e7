//! 変更されたイメージの検出

use crate::error::Result;
use crate::git::{Git, LAST_COMMIT_RANGE};
use crate::host::HostContext;
use std::collections::BTreeSet;

/// イメージ定義を置くディレクトリ
pub const IMAGES_DIR: &str = "images";

/// 共通ユーティリティ用の疑似イメージ (ビルド対象外)
pub const UTILITY_IMAGE: &str = "utils";

/// 差分を取る範囲
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffRange {
    /// 未コミットの変更のみ
    Uncommitted,
    /// 直近のコミット (ルートコミットなら空ツリーとの差分)
    LastCommit,
    /// mainline とのマージベースから HEAD まで
    Since(String),
}

impl DiffRange {
    fn as_range(&self) -> Option<String> {
        match self {
            DiffRange::Uncommitted => None,
            DiffRange::LastCommit => Some(LAST_COMMIT_RANGE.to_string()),
            DiffRange::Since(base) => Some(format!("{}..HEAD", base)),
        }
    }
}

pub struct ChangeDetector<'a> {
    git: &'a dyn Git,
    host: &'a HostContext,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(git: &'a dyn Git, host: &'a HostContext) -> Self {
        Self { git, host }
    }

    /// 作業ツリーの状態とブランチから差分範囲を決める
    pub async fn diff_range(&self) -> Result<DiffRange> {
        if self.host.dirty {
            return Ok(DiffRange::Uncommitted);
        }
        if self.host.is_mainline() {
            return Ok(DiffRange::LastCommit);
        }
        let base = self
            .git
            .merge_base(&self.host.project_dir, &self.host.mainline_ref())
            .await?;
        Ok(DiffRange::Since(base))
    }

    /// 変更のあったイメージ名の集合
    pub async fn modified_images(&self) -> Result<BTreeSet<String>> {
        let range = self.diff_range().await?;
        tracing::debug!(?range, "Detecting modified images");

        let paths = self
            .git
            .diff_names(
                &self.host.project_dir,
                range.as_range().as_deref(),
                IMAGES_DIR,
            )
            .await?;

        let images = images_from_paths(&paths);
        tracing::info!(
            "Modified images: {}",
            images.iter().cloned().collect::<Vec<_>>().join(", ")
        );
        Ok(images)
    }
}

/// `images/<name>/...` 形式のパスからイメージ名を取り出す
///
/// `images/` 直下のファイルなど、イメージディレクトリを指さないパスは無視する。
pub fn images_from_paths<S: AsRef<str>>(paths: &[S]) -> BTreeSet<String> {
    paths
        .iter()
        .filter_map(|path| {
            let mut parts = path.as_ref().splitn(3, '/');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(IMAGES_DIR), Some(name), Some(rest)) if !name.is_empty() && !rest.is_empty() => {
                    Some(name.to_string())
                }
                _ => {
                    tracing::debug!("Ignoring changed path: {}", path.as_ref());
                    None
                }
            }
        })
        .filter(|name| name != UTILITY_IMAGE)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::RemoteRef;
    use crate::model::PlatformId;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    /// diff_names の呼び出しを記録する git
    struct RecordingGit {
        paths: Vec<String>,
        ranges: Mutex<Vec<Option<String>>>,
    }

    impl RecordingGit {
        fn new(paths: &[&str]) -> Self {
            Self {
                paths: paths.iter().map(|s| s.to_string()).collect(),
                ranges: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Git for RecordingGit {
        async fn ls_remote(&self, _url: &str, _reference: &str) -> Result<Option<RemoteRef>> {
            Ok(None)
        }
        async fn clone_repo(&self, _url: &str, _dest: &Path) -> Result<()> {
            Ok(())
        }
        async fn fetch(&self, _dir: &Path) -> Result<()> {
            Ok(())
        }
        async fn checkout(&self, _dir: &Path, _reference: &str) -> Result<()> {
            Ok(())
        }
        async fn current_branch(&self, _dir: &Path) -> Result<String> {
            Ok("master".to_string())
        }
        async fn is_dirty(&self, _dir: &Path) -> Result<bool> {
            Ok(false)
        }
        async fn merge_base(&self, _dir: &Path, reference: &str) -> Result<String> {
            assert_eq!(reference, "origin/master");
            Ok("abc123".to_string())
        }
        async fn diff_names(
            &self,
            _dir: &Path,
            range: Option<&str>,
            path_filter: &str,
        ) -> Result<Vec<String>> {
            assert_eq!(path_filter, IMAGES_DIR);
            self.ranges
                .lock()
                .unwrap()
                .push(range.map(|r| r.to_string()));
            Ok(self.paths.clone())
        }
    }

    fn host(branch: &str, dirty: bool) -> HostContext {
        HostContext {
            project_dir: PathBuf::from("/work"),
            platform: PlatformId::linux("amd64"),
            branch: branch.to_string(),
            dirty,
            mainline: "master".to_string(),
            remote: "origin".to_string(),
        }
    }

    #[test]
    fn test_images_from_paths_excludes_utils() {
        let paths = [
            "images/foo/Dockerfile",
            "images/bar/src.py",
            "images/utils/common.py",
        ];
        let images = images_from_paths(&paths);
        assert_eq!(
            images,
            BTreeSet::from(["foo".to_string(), "bar".to_string()])
        );
    }

    #[test]
    fn test_images_from_paths_ignores_top_level_files() {
        let paths = ["images/README.md", "images/foo/a/b/c.txt", "docs/x.md"];
        let images = images_from_paths(&paths);
        assert_eq!(images, BTreeSet::from(["foo".to_string()]));
    }

    #[test]
    fn test_images_from_paths_dedup() {
        let paths = ["images/foo/Dockerfile", "images/foo/entrypoint.sh"];
        assert_eq!(images_from_paths(&paths).len(), 1);
    }

    #[tokio::test]
    async fn test_dirty_tree_diffs_uncommitted() {
        let git = RecordingGit::new(&["images/foo/Dockerfile"]);
        let host = host("feature/x", true);
        let detector = ChangeDetector::new(&git, &host);

        let images = detector.modified_images().await.unwrap();
        assert_eq!(images, BTreeSet::from(["foo".to_string()]));
        assert_eq!(*git.ranges.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn test_mainline_diffs_last_commit() {
        let git = RecordingGit::new(&[]);
        let host = host("master", false);
        let detector = ChangeDetector::new(&git, &host);

        assert_eq!(detector.diff_range().await.unwrap(), DiffRange::LastCommit);
        detector.modified_images().await.unwrap();
        assert_eq!(
            *git.ranges.lock().unwrap(),
            vec![Some("HEAD^..HEAD".to_string())]
        );
    }

    #[tokio::test]
    async fn test_branch_diffs_since_merge_base() {
        let git = RecordingGit::new(&["images/bar/src.py", "images/utils/x"]);
        let host = host("feature/x", false);
        let detector = ChangeDetector::new(&git, &host);

        let images = detector.modified_images().await.unwrap();
        assert_eq!(images, BTreeSet::from(["bar".to_string()]));
        assert_eq!(
            *git.ranges.lock().unwrap(),
            vec![Some("abc123..HEAD".to_string())]
        );
    }

    /// tempdir 上の git リポジトリ (プロジェクトは `docker/` 配下)
    struct Repo {
        dir: tempfile::TempDir,
    }

    impl Repo {
        fn new() -> Self {
            let repo = Self {
                dir: tempfile::tempdir().unwrap(),
            };
            repo.git(&["init", "--quiet"]);
            repo.git(&["symbolic-ref", "HEAD", "refs/heads/master"]);
            repo
        }

        fn git(&self, args: &[&str]) {
            let status = std::process::Command::new("git")
                .arg("-C")
                .arg(self.dir.path())
                .args([
                    "-c",
                    "user.name=archfleet",
                    "-c",
                    "user.email=archfleet@example.com",
                    "-c",
                    "commit.gpgsign=false",
                ])
                .args(args)
                .status()
                .unwrap();
            assert!(status.success(), "git {:?} failed", args);
        }

        fn commit(&self, path: &str, content: &str) {
            let file = self.dir.path().join(path);
            std::fs::create_dir_all(file.parent().unwrap()).unwrap();
            std::fs::write(&file, content).unwrap();
            self.git(&["add", "-A"]);
            self.git(&["commit", "--quiet", "-m", path]);
        }

        fn project(&self) -> HostContext {
            HostContext {
                project_dir: self.dir.path().join("docker"),
                ..host("master", false)
            }
        }
    }

    #[tokio::test]
    async fn test_project_in_subdirectory_of_repository() {
        let repo = Repo::new();
        repo.commit("docker/images/foo/Dockerfile", "FROM alpine\n");
        repo.commit("docker/images/foo/Dockerfile", "FROM alpine:3\n");

        let git = crate::git::GitCli::new();
        let host = repo.project();
        let detector = ChangeDetector::new(&git, &host);

        let images = detector.modified_images().await.unwrap();
        assert_eq!(images, BTreeSet::from(["foo".to_string()]));
    }

    #[tokio::test]
    async fn test_root_commit_on_mainline() {
        let repo = Repo::new();
        repo.commit("docker/images/bar/Dockerfile", "FROM alpine\n");

        let git = crate::git::GitCli::new();
        let host = repo.project();
        let detector = ChangeDetector::new(&git, &host);

        let images = detector.modified_images().await.unwrap();
        assert_eq!(images, BTreeSet::from(["bar".to_string()]));
    }

    #[tokio::test]
    async fn test_changes_outside_project_are_ignored() {
        let repo = Repo::new();
        repo.commit("docker/images/foo/Dockerfile", "FROM alpine\n");
        repo.commit("images/other/Dockerfile", "FROM alpine\n");

        let git = crate::git::GitCli::new();
        let host = repo.project();
        let detector = ChangeDetector::new(&git, &host);

        assert!(detector.modified_images().await.unwrap().is_empty());
    }
}
