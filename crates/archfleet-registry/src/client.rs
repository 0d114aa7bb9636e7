//! Registry API クライアントと `docker manifest` CLI ラッパー
//!
//! マニフェストリストの取得は Registry HTTP API (Bearer トークン) で行い、
//! 削除と公開は `docker manifest` に任せる。

use crate::error::{RegistryError, Result};
use crate::model::{MANIFEST_LIST_MEDIA_TYPE, ManifestList};
use crate::store::ManifestStore;
use archfleet_config::RegistryConfig;
use archfleet_core::split_image_tag;
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;

const USER_AGENT: &str = concat!("archfleet/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

pub struct RegistryClient {
    http: reqwest::Client,
    config: RegistryConfig,
    docker: DockerManifestCli,
}

impl RegistryClient {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            docker: DockerManifestCli::new(),
        }
    }

    pub fn with_docker(mut self, docker: DockerManifestCli) -> Self {
        self.docker = docker;
        self
    }

    /// リポジトリの pull スコープの匿名トークンを取得する
    pub async fn get_token(&self, repo: &str) -> Result<String> {
        let scope = format!("repository:{}:pull", repo);
        let response = self
            .http
            .get(&self.config.auth)
            .query(&[("service", self.config.service.as_str()), ("scope", scope.as_str())])
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RegistryError::Token {
                repo: repo.to_string(),
                message: format!("status {}", response.status()),
            });
        }

        let body: TokenResponse = response.json().await.map_err(|e| RegistryError::Token {
            repo: repo.to_string(),
            message: e.to_string(),
        })?;
        Ok(body.token)
    }

    /// `repo:tag` のマニフェストリストを取得する
    ///
    /// 存在しない場合もエラーになる。空リストとして扱いたい場合は
    /// [`ManifestStore::fetch`] を使う。
    pub async fn get_manifest_list(&self, repo_tag: &str) -> Result<ManifestList> {
        let (repo, tag) = split_image_tag(repo_tag);
        if repo.is_empty() || tag.is_empty() {
            return Err(RegistryError::InvalidReference(repo_tag.to_string()));
        }

        let token = self.get_token(repo).await?;
        let url = format!("{}/v2/{}/manifests/{}", self.config.url, repo, tag);
        tracing::debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header("Accept", MANIFEST_LIST_MEDIA_TYPE)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::ManifestFetch {
                repo_tag: repo_tag.to_string(),
                message: format!("status {}", status),
            });
        }

        let headers = response.headers();
        let media_type = headers
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let version = headers
            .get("Docker-Content-Digest")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await?;
        let mut list = ManifestList::decode(repo_tag, media_type.as_deref(), &body)?;
        list.version = version;
        Ok(list)
    }

    /// レジストリ上のマニフェストリストを作り直す前に消す
    pub async fn delete_manifest(&self, repo_tag: &str) -> Result<()> {
        self.docker.remove(repo_tag).await
    }

    pub async fn create_and_push_manifest_list(
        &self,
        repo_tag: &str,
        digest_refs: &[String],
    ) -> Result<()> {
        self.docker.create_and_push(repo_tag, digest_refs).await
    }
}

#[async_trait]
impl ManifestStore for RegistryClient {
    async fn fetch(&self, repo_tag: &str) -> ManifestList {
        match self.get_manifest_list(repo_tag).await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!("No usable manifest list for {}: {}", repo_tag, e);
                ManifestList::empty(repo_tag)
            }
        }
    }

    /// 削除してから作り直す
    ///
    /// レジストリ側で条件付き更新ができないので `expected` は照合しない。
    async fn replace(&self, expected: &ManifestList, next: &ManifestList) -> Result<()> {
        tracing::debug!(
            "Replacing {} (fetched version {:?})",
            next.repo_tag,
            expected.version
        );
        self.delete_manifest(&next.repo_tag).await?;
        self.create_and_push_manifest_list(&next.repo_tag, &next.digest_refs())
            .await
    }
}

/// `docker manifest` コマンドのラッパー
#[derive(Debug, Clone)]
pub struct DockerManifestCli {
    program: String,
}

impl Default for DockerManifestCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerManifestCli {
    pub fn new() -> Self {
        Self {
            program: "docker".to_string(),
        }
    }

    /// 別の実行ファイルを使う (テスト用)
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> std::result::Result<String, String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        cmd.env("DOCKER_CLI_EXPERIMENTAL", "enabled");
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: {} {}", self.program, args.join(" "));

        let output = cmd.output().await.map_err(|e| e.to_string())?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// ローカルのマニフェストリストを削除する。存在しなければ何もしない
    pub async fn remove(&self, repo_tag: &str) -> Result<()> {
        match self.run(&["manifest", "rm", repo_tag]).await {
            Ok(_) => Ok(()),
            Err(stderr) if stderr.contains("No such manifest") => Ok(()),
            Err(message) => Err(RegistryError::ManifestPublish {
                repo_tag: repo_tag.to_string(),
                message,
            }),
        }
    }

    /// `refs` からマニフェストリストを作成して push する
    pub async fn create_and_push(&self, repo_tag: &str, refs: &[String]) -> Result<()> {
        if refs.is_empty() {
            return Err(RegistryError::ManifestPublish {
                repo_tag: repo_tag.to_string(),
                message: "no entries".to_string(),
            });
        }

        let mut create = vec!["manifest", "create", repo_tag];
        create.extend(refs.iter().map(String::as_str));
        self.run(&create)
            .await
            .map_err(|message| RegistryError::ManifestPublish {
                repo_tag: repo_tag.to_string(),
                message,
            })?;

        self.run(&["manifest", "push", "-p", repo_tag])
            .await
            .map_err(|message| RegistryError::ManifestPublish {
                repo_tag: repo_tag.to_string(),
                message,
            })?;

        tracing::info!("Published manifest list {} ({} entries)", repo_tag, refs.len());
        Ok(())
    }
}
