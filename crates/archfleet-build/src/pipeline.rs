//! 1ジョブ分のビルド
//!
//! ソース解決 → 展開 → ビルド → (push 時) マニフェストリストの再構成

use crate::builder::{BuildMode, BuildRequest, ImageBuilder};
use crate::error::{BuildError, Result};
use crate::scheduler::JobRunner;
use archfleet_config::ProjectConfig;
use archfleet_core::{BuildJob, HostContext, KeyedLocks};
use archfleet_registry::ManifestReconciler;
use archfleet_source::SourceRegistry;
use async_trait::async_trait;
use colored::Colorize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct BuildPipeline {
    host: HostContext,
    group: String,
    label_prefix: Option<String>,
    sources: SourceRegistry,
    builder: Arc<dyn ImageBuilder>,
    reconciler: Arc<ManifestReconciler>,
    /// 同じイメージのジョブは作業ディレクトリとローカルタグを共有するため直列化する
    image_locks: KeyedLocks,
}

impl BuildPipeline {
    pub fn new(
        host: HostContext,
        project: &ProjectConfig,
        sources: SourceRegistry,
        builder: Arc<dyn ImageBuilder>,
        reconciler: Arc<ManifestReconciler>,
    ) -> Self {
        Self {
            host,
            group: project.group.clone(),
            label_prefix: project.label_prefix.clone(),
            sources,
            builder,
            reconciler,
            image_locks: KeyedLocks::new(),
        }
    }

    pub fn host(&self) -> &HostContext {
        &self.host
    }

    fn labels(&self, fingerprint: Option<&str>) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        if let Some(prefix) = &self.label_prefix {
            if let Some(fingerprint) = fingerprint {
                labels.insert(format!("{}.revision", prefix), fingerprint.to_string());
            }
            labels.insert(format!("{}.branch", prefix), self.host.branch.clone());
        }
        labels
    }
}

#[async_trait]
impl JobRunner for BuildPipeline {
    #[tracing::instrument(skip_all, fields(image = %job.image, platform = %job.platform))]
    async fn run(&self, job: &BuildJob) -> Result<()> {
        let _guard = self.image_locks.lock(&job.image.name).await;

        let context_dir = self.host.images_dir().join(&job.image.name);
        let dockerfile = context_dir.join("Dockerfile");
        if !dockerfile.is_file() {
            return Err(BuildError::DockerfileNotFound(dockerfile));
        }

        let (build_args, fingerprint) = match self.sources.get(&job.image.name) {
            Some(provider) => {
                let revision = provider.resolve(&job.image.tag).await?;
                tracing::info!("Resolved sources: {}", revision.fingerprint());
                let checkout = provider.materialize(&revision).await?;
                (checkout.build_args, Some(revision.fingerprint()))
            }
            None => {
                tracing::debug!("No source recipe for {}", job.image.name);
                (BTreeMap::new(), None)
            }
        };

        let tag = self.host.full_tag(&self.group, &job.image);
        let mode = if self.host.needs_emulation(&job.platform) {
            BuildMode::Cross
        } else {
            BuildMode::Native
        };

        println!(
            "{} {} ({})",
            "▶".blue().bold(),
            tag.cyan(),
            job.platform.to_string().yellow()
        );

        let request = BuildRequest {
            context_dir,
            tag: tag.clone(),
            build_args,
            labels: self.labels(fingerprint.as_deref()),
            platform: job.platform.clone(),
            mode,
        };
        self.builder.build(&request).await?;

        if job.push {
            let list = self.reconciler.reconcile(&tag, &job.platform).await?;
            let platforms: Vec<String> = list.platforms().map(ToString::to_string).collect();
            println!(
                "{} {} [{}]",
                "✓".green().bold(),
                tag,
                platforms.join(", ")
            );
        } else {
            println!("{} {}", "✓".green().bold(), tag);
        }

        Ok(())
    }
}
