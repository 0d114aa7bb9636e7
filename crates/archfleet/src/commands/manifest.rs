//! archfleet manifest

use archfleet_config::{ConfigError, RegistryConfig};
use archfleet_registry::RegistryClient;
use colored::Colorize;

/// プロジェクト外では Docker Hub を使う
fn registry_config() -> anyhow::Result<RegistryConfig> {
    match archfleet_config::load_config() {
        Ok(config) => Ok(config.registry),
        Err(ConfigError::ConfigNotFound) => Ok(RegistryConfig::default()),
        Err(e) => Err(e.into()),
    }
}

pub async fn handle(repo_tag: &str) -> anyhow::Result<()> {
    let client = RegistryClient::new(registry_config()?);
    let list = client.get_manifest_list(repo_tag).await?;

    println!("{}", repo_tag.cyan().bold());
    if let Some(version) = &list.version {
        println!("  {} {}", "digest:".dimmed(), version);
    }
    if list.is_empty() {
        println!("  {}", "(no entries)".dimmed());
    }
    for entry in list.entries() {
        println!("  {:<14} {}", entry.platform.to_string().green(), entry.digest);
    }
    Ok(())
}
