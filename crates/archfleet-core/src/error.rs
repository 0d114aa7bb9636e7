use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unsupported machine type: {0}")]
    UnsupportedMachine(String),

    #[error("Invalid platform '{0}' (expected os/arch, e.g. linux/amd64)")]
    InvalidPlatform(String),

    #[error("Invalid image '{0}' (expected name or name:tag)")]
    InvalidImage(String),

    #[error("git {command} failed: {message}")]
    Git { command: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
