//! archfleet changed

use archfleet_core::{ChangeDetector, GitCli, HostContext};

pub async fn handle(host: &HostContext) -> anyhow::Result<()> {
    let git = GitCli::new();
    let images = ChangeDetector::new(&git, host).modified_images().await?;
    for image in images {
        println!("{}", image);
    }
    Ok(())
}
