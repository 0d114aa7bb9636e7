//! git CLI wrapper
//!
//! バージョン管理操作はすべて [`Git`] トレイト越しに行う。
//! 実装 [`GitCli`] はシステムの git コマンドを呼び出す。

use crate::error::{CoreError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// 直近のコミットの差分範囲
pub const LAST_COMMIT_RANGE: &str = "HEAD^..HEAD";

/// `git ls-remote` の1行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    pub revision: String,
    pub full_ref: String,
}

#[async_trait]
pub trait Git: Send + Sync {
    /// リモートの ref を解決する。該当なしの場合は `None`
    async fn ls_remote(&self, url: &str, reference: &str) -> Result<Option<RemoteRef>>;

    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()>;

    async fn fetch(&self, dir: &Path) -> Result<()>;

    async fn checkout(&self, dir: &Path, reference: &str) -> Result<()>;

    async fn current_branch(&self, dir: &Path) -> Result<String>;

    /// 作業ツリーに未コミットの変更があるか
    async fn is_dirty(&self, dir: &Path) -> Result<bool>;

    async fn merge_base(&self, dir: &Path, reference: &str) -> Result<String>;

    /// `range` が `None` の場合は未コミットの変更を対象にする
    async fn diff_names(
        &self,
        dir: &Path,
        range: Option<&str>,
        path_filter: &str,
    ) -> Result<Vec<String>>;
}

/// システムの git を使う実装
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    async fn output(&self, dir: Option<&Path>, args: &[&str]) -> Result<std::process::Output> {
        let mut cmd = Command::new("git");
        if let Some(dir) = dir {
            cmd.arg("-C").arg(dir);
        }
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: git {}", args.join(" "));

        Ok(cmd.output().await?)
    }

    /// HEAD に親コミットがあるか
    async fn has_parent(&self, dir: &Path) -> Result<bool> {
        let output = self
            .output(Some(dir), &["rev-parse", "--verify", "--quiet", "HEAD^"])
            .await?;
        Ok(output.status.success())
    }

    /// git を実行して stdout を返す
    async fn run(&self, dir: Option<&Path>, args: &[&str]) -> Result<String> {
        let output = self.output(dir, args).await?;

        if !output.status.success() {
            return Err(CoreError::Git {
                command: args.first().copied().unwrap_or_default().to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// `git ls-remote` の出力から ref を選ぶ
///
/// 注釈付きタグは `^{}` 付きの行 (コミット) を優先する。
pub fn parse_ls_remote(output: &str) -> Option<RemoteRef> {
    let refs: Vec<RemoteRef> = output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let revision = parts.next()?;
            let full_ref = parts.next()?;
            Some(RemoteRef {
                revision: revision.to_string(),
                full_ref: full_ref.to_string(),
            })
        })
        .collect();

    if let Some(peeled) = refs.iter().find(|r| r.full_ref.ends_with("^{}")) {
        return Some(RemoteRef {
            revision: peeled.revision.clone(),
            full_ref: peeled.full_ref.trim_end_matches("^{}").to_string(),
        });
    }

    refs.into_iter().next()
}

#[async_trait]
impl Git for GitCli {
    async fn ls_remote(&self, url: &str, reference: &str) -> Result<Option<RemoteRef>> {
        let output = self.run(None, &["ls-remote", url, reference]).await?;
        Ok(parse_ls_remote(&output))
    }

    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        let dest = dest.to_string_lossy();
        self.run(None, &["clone", url, &dest]).await?;
        Ok(())
    }

    async fn fetch(&self, dir: &Path) -> Result<()> {
        self.run(Some(dir), &["fetch", "--tags", "origin"]).await?;
        Ok(())
    }

    async fn checkout(&self, dir: &Path, reference: &str) -> Result<()> {
        self.run(Some(dir), &["checkout", "--detach", reference])
            .await?;
        Ok(())
    }

    async fn current_branch(&self, dir: &Path) -> Result<String> {
        let output = self.run(Some(dir), &["branch", "--show-current"]).await?;
        Ok(output.trim().to_string())
    }

    async fn is_dirty(&self, dir: &Path) -> Result<bool> {
        let output = self.output(Some(dir), &["diff", "--quiet"]).await?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(CoreError::Git {
                command: "diff".to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    async fn merge_base(&self, dir: &Path, reference: &str) -> Result<String> {
        match self
            .run(Some(dir), &["merge-base", "--fork-point", reference])
            .await
        {
            Ok(output) if !output.trim().is_empty() => Ok(output.trim().to_string()),
            // reflog が無いクローン (CI 等) では fork-point が解決できない
            _ => {
                let output = self
                    .run(Some(dir), &["merge-base", "HEAD", reference])
                    .await?;
                Ok(output.trim().to_string())
            }
        }
    }

    async fn diff_names(
        &self,
        dir: &Path,
        range: Option<&str>,
        path_filter: &str,
    ) -> Result<Vec<String>> {
        // パスは `dir` からの相対になる (プロジェクトがリポジトリのサブディレクトリでもよい)
        let root_commit = range == Some(LAST_COMMIT_RANGE) && !self.has_parent(dir).await?;
        let mut args = if root_commit {
            // ルートコミットは空ツリーとの差分
            vec![
                "diff-tree",
                "--root",
                "--no-commit-id",
                "-r",
                "--name-only",
                "--relative",
                "HEAD",
            ]
        } else {
            let mut args = vec!["diff", "--name-only", "--relative"];
            args.extend(range);
            args
        };
        args.push("--");
        args.push(path_filter);

        let output = self.run(Some(dir), &args).await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ls_remote_branch() {
        let output = "4f2a9c1e\trefs/heads/main\n";
        let r = parse_ls_remote(output).unwrap();
        assert_eq!(r.revision, "4f2a9c1e");
        assert_eq!(r.full_ref, "refs/heads/main");
    }

    #[test]
    fn test_parse_ls_remote_prefers_peeled_tag() {
        let output = "aaaa\trefs/tags/v1.0.0\nbbbb\trefs/tags/v1.0.0^{}\n";
        let r = parse_ls_remote(output).unwrap();
        assert_eq!(r.revision, "bbbb");
        assert_eq!(r.full_ref, "refs/tags/v1.0.0");
    }

    #[test]
    fn test_parse_ls_remote_empty() {
        assert!(parse_ls_remote("").is_none());
        assert!(parse_ls_remote("\n").is_none());
    }
}
