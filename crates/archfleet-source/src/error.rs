use archfleet_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("ref '{reference}' not found in {url}")]
    RefNotFound { url: String, reference: String },

    #[error("no source recipe registered for image '{0}'")]
    UnknownImage(String),

    #[error("download failed: {url}: {message}")]
    Download { url: String, message: String },

    #[error("failed to extract {path}: {message}")]
    Extract { path: PathBuf, message: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SourceError>;
