//! archfleet core
//!
//! マルチアーキテクチャイメージのビルドで共有されるモデルと、
//! ホスト環境の検出、バージョン管理 (git) との連携を提供します。

pub mod changes;
pub mod error;
pub mod git;
pub mod host;
pub mod lock;
pub mod model;

pub use changes::{ChangeDetector, DiffRange, IMAGES_DIR, UTILITY_IMAGE, images_from_paths};
pub use error::{CoreError, Result};
pub use git::{Git, GitCli, RemoteRef};
pub use host::HostContext;
pub use lock::KeyedLocks;
pub use model::{BuildJob, DEFAULT_TAG, ImageSpec, PlatformId, arch_tag, branch_suffix, split_image_tag};
