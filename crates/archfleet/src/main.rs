mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "archfleet")]
#[command(about = "Multi-architecture container image builds with per-platform manifest list updates", long_about = None)]
struct Cli {
    /// デバッグログを出力
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// イメージをビルド (--push でマニフェストリストも更新)
    Build {
        /// IMAGE[:TAG] (省略時は変更のあったイメージ)
        images: Vec<String>,
        /// os/arch (省略時はホストのプラットフォーム)
        #[arg(
            short,
            long = "platform",
            env = "ARCHFLEET_PLATFORMS",
            value_delimiter = ','
        )]
        platform: Vec<String>,
        /// ビルド後に push してマニフェストリストを更新
        #[arg(long)]
        push: bool,
    },
    /// 変更のあったイメージを表示
    Changed,
    /// イメージのソース revision を解決して表示
    Resolve {
        image: String,
        /// バージョン (latest、エイリアス、または v を付けて引くタグ)
        #[arg(default_value = "latest")]
        version: String,
    },
    /// レジストリ上のマニフェストリストを表示
    Manifest {
        /// REPO:TAG (例: group/proxy:latest)
        repo_tag: String,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Version => {
            println!("archfleet {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Manifest { repo_tag } => {
            commands::manifest::handle(&repo_tag).await?;
        }
        Commands::Resolve { image, version } => {
            let config = archfleet_config::load_config()?;
            commands::resolve::handle(&config, &image, &version).await?;
        }
        Commands::Changed => {
            let (_, host) = commands::load_project().await?;
            commands::changed::handle(&host).await?;
        }
        Commands::Build {
            images,
            platform,
            push,
        } => {
            let (config, host) = commands::load_project().await?;
            commands::build::handle(&config, host, &images, &platform, push).await?;
        }
    }

    Ok(())
}
