//! Docker Engine API に渡すビルドコンテキスト

use crate::error::{BuildError, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::Path;
use tar::Builder;

/// コンテキストに含めないディレクトリ
pub const CONTEXT_EXCLUDES: [&str; 2] = [".git", ".cache"];

const LARGE_CONTEXT: usize = 500 * 1024 * 1024;

/// イメージディレクトリを tar.gz にまとめる
///
/// Dockerfile はディレクトリ直下にある前提。ソースアーカイブのキャッシュは除外する。
pub fn create_context(image_dir: &Path) -> Result<Vec<u8>> {
    let dockerfile = image_dir.join("Dockerfile");
    if !dockerfile.is_file() {
        return Err(BuildError::DockerfileNotFound(dockerfile));
    }

    tracing::debug!("Creating build context from: {}", image_dir.display());

    let mut data = Vec::new();
    {
        let encoder = GzEncoder::new(&mut data, Compression::default());
        let mut tar = Builder::new(encoder);
        tar.follow_symlinks(false);
        append_tree(&mut tar, image_dir, Path::new(""))?;
        tar.into_inner()?.finish()?;
    }

    tracing::debug!("Build context created: {} bytes", data.len());
    if data.len() > LARGE_CONTEXT {
        tracing::warn!(
            "Build context is {}MB; consider a .dockerignore",
            data.len() / 1024 / 1024
        );
    }

    Ok(data)
}

fn append_tree<W: std::io::Write>(tar: &mut Builder<W>, root: &Path, rel: &Path) -> Result<()> {
    let mut entries = std::fs::read_dir(root.join(rel))?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        if CONTEXT_EXCLUDES.iter().any(|ex| name == *ex) {
            continue;
        }
        let rel_path = rel.join(&name);
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            tar.append_dir(&rel_path, entry.path())?;
            append_tree(tar, root, &rel_path)?;
        } else {
            tar.append_path_with_name(entry.path(), &rel_path)?;
        }
    }
    Ok(())
}
