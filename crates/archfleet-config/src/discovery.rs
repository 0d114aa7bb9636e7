//! 設定ファイルの発見
//!
//! 環境変数 → カレントディレクトリから上方向への探索の順に
//! `archfleet.kdl` を探す。

use crate::error::{ConfigError, Result};
use crate::model::Config;
use crate::parser::parse_config_file;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CONFIG_FILENAME: &str = "archfleet.kdl";

pub const CONFIG_PATH_ENV: &str = "ARCHFLEET_CONFIG_PATH";

/// archfleet.kdl を発見する
#[tracing::instrument]
pub fn find_config() -> Result<PathBuf> {
    if let Ok(path_str) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(&path_str);
        if path.is_file() {
            info!(config_path = %path.display(), "Found config from environment variable");
            return Ok(path);
        }
        warn!(env_path = %path_str, "{} is set but file does not exist", CONFIG_PATH_ENV);
        return Err(ConfigError::ConfigNotFound);
    }

    let start_dir = std::env::current_dir()?;
    find_config_from(&start_dir).ok_or(ConfigError::ConfigNotFound)
}

/// 指定ディレクトリから上方向に archfleet.kdl を探す
pub fn find_config_from(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    debug!(start_dir = %start_dir.display(), "Searching for {}", CONFIG_FILENAME);

    loop {
        let candidate = current.join(CONFIG_FILENAME);
        if candidate.is_file() {
            info!(config_path = %candidate.display(), "Found config file");
            return Some(candidate);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// 設定ファイルを発見して読み込む
pub fn load_config() -> Result<Config> {
    let path = find_config()?;
    parse_config_file(&path)
}
