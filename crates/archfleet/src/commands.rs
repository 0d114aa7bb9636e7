//! サブコマンドのハンドラ

pub mod build;
pub mod changed;
pub mod manifest;
pub mod resolve;

use archfleet_config::Config;
use archfleet_core::{GitCli, HostContext};

/// 設定ファイルを読み込み、ホストの状態を調べる
pub async fn load_project() -> anyhow::Result<(Config, HostContext)> {
    let config = archfleet_config::load_config()?;
    let host = HostContext::detect(
        &GitCli::new(),
        &config.root,
        &config.project.mainline,
        &config.project.remote,
    )
    .await?;
    Ok((config, host))
}
