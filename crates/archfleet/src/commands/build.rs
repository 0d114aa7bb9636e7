//! archfleet build

use archfleet_build::{BuildPipeline, BuildScheduler, DockerEngine, ImagePusher};
use archfleet_config::Config;
use archfleet_core::{GitCli, HostContext, ImageSpec, PlatformId};
use archfleet_registry::{ManifestReconciler, RegistryClient};
use archfleet_source::{HttpFetcher, SourceRegistry};
use colored::Colorize;
use std::sync::Arc;

pub async fn handle(
    config: &Config,
    host: HostContext,
    images: &[String],
    platforms: &[String],
    push: bool,
) -> anyhow::Result<()> {
    let images = images
        .iter()
        .map(|s| s.parse::<ImageSpec>())
        .collect::<Result<Vec<_>, _>>()?;
    let platforms = platforms
        .iter()
        .map(|s| s.parse::<PlatformId>())
        .collect::<Result<Vec<_>, _>>()?;

    for platform in platforms.iter().filter(|p| !p.is_known()) {
        tracing::warn!("{} is not a known build platform", platform);
    }

    println!("{}", "🔨 archfleet build".blue().bold());
    println!(
        "  branch: {}{}",
        host.branch.cyan(),
        if host.dirty { " (dirty)" } else { "" }
    );
    println!("  host:   {}", host.platform.to_string().cyan());
    println!();

    let git = Arc::new(GitCli::new());
    let sources = SourceRegistry::from_config(config, git.clone(), Arc::new(HttpFetcher::default()));

    let engine = DockerEngine::connect()?;
    let pusher = Arc::new(ImagePusher::new(engine.clone()));
    let store = Arc::new(RegistryClient::new(config.registry.clone()));
    let reconciler = Arc::new(ManifestReconciler::new(store, pusher));

    let pipeline = BuildPipeline::new(
        host.clone(),
        &config.project,
        sources,
        Arc::new(engine),
        reconciler,
    );
    let scheduler = BuildScheduler::new(Arc::new(pipeline), config.project.concurrency);

    scheduler
        .build(&host, git.as_ref(), platforms, images, push)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    println!();
    println!("{}", "✓ Build complete".green().bold());
    Ok(())
}
