//! (イメージ × プラットフォーム) のジョブ実行
//!
//! ジョブは展開順に投入し、同時実行数は明示した上限で抑える。
//! 最初の失敗で新規投入を止め、実行中のジョブの終了を待ってからその失敗を返す。

use crate::error::{BuildError, Result};
use archfleet_core::{BuildJob, ChangeDetector, DEFAULT_TAG, Git, HostContext, ImageSpec, PlatformId};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;

/// 1ジョブを最後まで実行する
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &BuildJob) -> Result<()>;
}

pub struct BuildScheduler {
    runner: Arc<dyn JobRunner>,
    concurrency: usize,
}

impl BuildScheduler {
    /// `concurrency` は 1 以上に丸める
    pub fn new(runner: Arc<dyn JobRunner>, concurrency: usize) -> Self {
        Self {
            runner,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// 省略された引数を補ってビルドする
    ///
    /// - `platforms` が空ならホストのネイティブプラットフォーム
    /// - `images` が空なら変更のあったイメージ (タグは `latest`)
    pub async fn build(
        &self,
        host: &HostContext,
        git: &dyn Git,
        platforms: Vec<PlatformId>,
        images: Vec<ImageSpec>,
        push: bool,
    ) -> Result<()> {
        let platforms = if platforms.is_empty() {
            vec![host.platform.clone()]
        } else {
            platforms
        };

        let images = if images.is_empty() {
            ChangeDetector::new(git, host)
                .modified_images()
                .await?
                .into_iter()
                .map(|name| ImageSpec::new(name, DEFAULT_TAG))
                .collect()
        } else {
            images
        };

        let jobs = BuildJob::expand(&images, &platforms, push);
        if jobs.is_empty() {
            tracing::info!("Nothing to build");
            return Ok(());
        }

        self.run(jobs).await
    }

    /// ジョブを実行する。最初の失敗を返す
    pub async fn run(&self, jobs: Vec<BuildJob>) -> Result<()> {
        tracing::info!(
            "Scheduling {} job(s) with concurrency {}",
            jobs.len(),
            self.concurrency
        );

        let mut pending = jobs.into_iter();
        let mut in_flight = JoinSet::new();
        let mut first_error: Option<BuildError> = None;

        loop {
            while first_error.is_none() && in_flight.len() < self.concurrency {
                let Some(job) = pending.next() else {
                    break;
                };
                let runner = self.runner.clone();
                tracing::debug!(job = %job, "Submitting job");
                in_flight.spawn(async move {
                    let result = runner.run(&job).await;
                    (job, result)
                });
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };

            let failure = match joined {
                Ok((job, Ok(()))) => {
                    tracing::info!(job = %job, "Job finished");
                    continue;
                }
                Ok((job, Err(e))) => {
                    tracing::error!(job = %job, "Job failed: {}", e);
                    e
                }
                Err(e) => BuildError::JobPanicked(e.to_string()),
            };

            if first_error.is_none() {
                let remaining = pending.len();
                if remaining > 0 {
                    tracing::warn!("Skipping {} pending job(s) after failure", remaining);
                }
                first_error = Some(failure);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
