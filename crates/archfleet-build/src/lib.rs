//! archfleet のビルド実行
//!
//! 外部ビルダー (Docker) の呼び出し、アーキテクチャ別イメージの push、
//! ジョブ単位のパイプライン、上限付きで fail-fast なスケジューラを提供します。

pub mod auth;
pub mod builder;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod pusher;
pub mod scheduler;

pub use auth::{RegistryAuth, registry_host};
pub use builder::{BuildMode, BuildRequest, DockerEngine, ImageBuilder, buildx_args};
pub use context::create_context;
pub use error::{BuildError, Result};
pub use pipeline::BuildPipeline;
pub use pusher::{ImagePusher, parse_pushed_digest, validate_tag};
pub use scheduler::{BuildScheduler, JobRunner};
