use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to get token for {repo}: {message}")]
    Token { repo: String, message: String },

    #[error("Failed to get manifest list {repo_tag}: {message}")]
    ManifestFetch { repo_tag: String, message: String },

    #[error("Unsupported manifest media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Failed to publish manifest list {repo_tag}: {message}")]
    ManifestPublish { repo_tag: String, message: String },

    #[error("Failed to push {tag}: {message}")]
    Push { tag: String, message: String },

    #[error("Manifest list {0} changed since it was fetched")]
    Conflict(String),

    #[error("Invalid image reference: {0}")]
    InvalidReference(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
