//! archfleet resolve

use archfleet_config::Config;
use archfleet_core::GitCli;
use archfleet_source::{HttpFetcher, SourceRegistry};
use colored::Colorize;
use std::sync::Arc;

/// ソースを解決して表示する (ダウンロードはしない)
pub async fn handle(config: &Config, image: &str, version: &str) -> anyhow::Result<()> {
    let sources = SourceRegistry::from_config(
        config,
        Arc::new(GitCli::new()),
        Arc::new(HttpFetcher::default()),
    );
    let revision = sources.require(image)?.resolve(version).await?;

    println!("{} {}:{}", "Sources for".bold(), image.cyan(), version);
    for component in &revision.components {
        let origin = match &component.local {
            Some(path) => format!(" ({})", path.display()),
            None => String::new(),
        };
        println!(
            "  {:<14} {:<20} {}{}",
            component.component.green(),
            component.reference,
            component.revision.yellow(),
            origin.dimmed()
        );
    }
    println!("{} {}", "fingerprint:".dimmed(), revision.fingerprint());
    Ok(())
}
