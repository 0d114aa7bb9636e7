//! 外部ビルダー (Docker) の呼び出し
//!
//! ネイティブプラットフォームは Docker Engine API で、それ以外は
//! `docker buildx build --load` (エミュレーション) でビルドする。

use crate::context::create_context;
use crate::error::{BuildError, Result};
use archfleet_core::PlatformId;
use async_trait::async_trait;
use bollard::Docker;
use colored::Colorize;
use futures_util::stream::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tokio::process::Command;

/// ビルドの実行方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    Native,
    /// ホストと異なるプラットフォーム向け
    Cross,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Dockerfile を含むディレクトリ
    pub context_dir: PathBuf,
    pub tag: String,
    pub build_args: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub platform: PlatformId,
    pub mode: BuildMode,
}

#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// ディレクトリをビルドしてローカルに `tag` として残す
    async fn build(&self, request: &BuildRequest) -> Result<()>;
}

/// Docker を使う実装
#[derive(Clone)]
pub struct DockerEngine {
    pub(crate) docker: Docker,
}

impl DockerEngine {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    pub fn connect() -> Result<Self> {
        Ok(Self::new(Docker::connect_with_local_defaults()?))
    }

    async fn build_native(&self, request: &BuildRequest) -> Result<()> {
        let context_dir = request.context_dir.clone();
        let context = tokio::task::spawn_blocking(move || create_context(&context_dir))
            .await
            .map_err(|e| BuildError::JobPanicked(e.to_string()))??;

        let build_args: HashMap<&str, &str> = request
            .build_args
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let labels: HashMap<&str, &str> = request
            .labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let platform = request.platform.to_string();

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions {
            dockerfile: "Dockerfile",
            t: request.tag.as_str(),
            buildargs: build_args,
            labels,
            platform: platform.as_str(),
            rm: true,
            forcerm: true,
            pull: true,
            ..Default::default()
        };

        use bytes::Bytes;
        use http_body_util::{Either, Full};
        let body = Full::new(Bytes::from(context));
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        while let Some(msg) = stream.next().await {
            let info = msg?;
            if let Some(out) = info.stream {
                print!("{}", out);
            }
            if let Some(error) = info.error {
                return Err(BuildError::BuildFailed {
                    tag: request.tag.clone(),
                    message: error,
                });
            }
            if let Some(detail) = info.error_detail {
                return Err(BuildError::BuildFailed {
                    tag: request.tag.clone(),
                    message: detail
                        .message
                        .unwrap_or_else(|| "Unknown build error".to_string()),
                });
            }
            if let Some(status) = info.status {
                println!("{}", status.cyan());
            }
        }

        Ok(())
    }

    async fn build_cross(&self, request: &BuildRequest) -> Result<()> {
        let args = buildx_args(request);
        tracing::debug!("Running: docker {}", args.join(" "));

        let status = Command::new("docker")
            .args(&args)
            .status()
            .await
            .map_err(|e| BuildError::BuildFailed {
                tag: request.tag.clone(),
                message: format!("Failed to run docker buildx: {}", e),
            })?;

        if !status.success() {
            return Err(BuildError::BuildFailed {
                tag: request.tag.clone(),
                message: format!("docker buildx build exited with {}", status),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ImageBuilder for DockerEngine {
    #[tracing::instrument(skip(self, request), fields(tag = %request.tag, platform = %request.platform))]
    async fn build(&self, request: &BuildRequest) -> Result<()> {
        tracing::info!("Building {:?}", request.mode);
        match request.mode {
            BuildMode::Native => self.build_native(request).await?,
            BuildMode::Cross => self.build_cross(request).await?,
        }
        tracing::info!("Successfully built: {}", request.tag);
        Ok(())
    }
}

/// `docker buildx build` の引数
pub fn buildx_args(request: &BuildRequest) -> Vec<String> {
    let mut args = vec![
        "buildx".to_string(),
        "build".to_string(),
        "--platform".to_string(),
        request.platform.to_string(),
        "-t".to_string(),
        request.tag.clone(),
        "--load".to_string(),
    ];
    for (key, value) in &request.build_args {
        args.push("--build-arg".to_string());
        args.push(format!("{}={}", key, value));
    }
    for (key, value) in &request.labels {
        args.push("--label".to_string());
        args.push(format!("{}={}", key, value));
    }
    args.push(request.context_dir.display().to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BuildRequest {
        BuildRequest {
            context_dir: PathBuf::from("/work/images/proxy"),
            tag: "group/proxy:latest".to_string(),
            build_args: BTreeMap::from([
                ("BACKEND_REVISION".to_string(), "abc".to_string()),
                ("SOURCE_REVISION".to_string(), "backend:abc".to_string()),
            ]),
            labels: BTreeMap::from([("org.example.branch".to_string(), "master".to_string())]),
            platform: PlatformId::linux("arm64"),
            mode: BuildMode::Cross,
        }
    }

    #[test]
    fn test_buildx_args() {
        let args = buildx_args(&request());
        assert_eq!(
            args,
            vec![
                "buildx",
                "build",
                "--platform",
                "linux/arm64",
                "-t",
                "group/proxy:latest",
                "--load",
                "--build-arg",
                "BACKEND_REVISION=abc",
                "--build-arg",
                "SOURCE_REVISION=backend:abc",
                "--label",
                "org.example.branch=master",
                "/work/images/proxy",
            ]
        );
    }

    #[tokio::test]
    #[ignore] // Docker接続が必要なため、通常のテストではスキップ
    async fn test_native_build() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM alpine:latest\n").unwrap();

        let engine = DockerEngine::connect().unwrap();
        let mut request = request();
        request.context_dir = dir.path().to_path_buf();
        request.tag = "archfleet-test:latest".to_string();
        request.platform = archfleet_core::PlatformId::host().unwrap();
        request.mode = BuildMode::Native;

        engine.build(&request).await.unwrap();
    }
}
