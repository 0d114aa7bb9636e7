//! push 用のレジストリ認証
//!
//! Docker CLI と同じく `config.json` の `auths`、`credHelpers`、`credsStore`
//! の順に認証情報を探す。

use crate::error::{BuildError, Result};
use base64::Engine;
use bollard::auth::DockerCredentials;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Docker Hub の認証キー (config.json 上の表記)
const DOCKER_HUB_KEYS: [&str; 3] = [
    "https://index.docker.io/v1/",
    "index.docker.io",
    "docker.io",
];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    #[serde(default)]
    cred_helpers: HashMap<String, String>,
    #[serde(default)]
    creds_store: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthEntry {
    /// Base64 の "username:password"
    auth: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HelperResponse {
    username: String,
    secret: String,
}

#[derive(Debug, Clone)]
pub struct RegistryAuth {
    config_path: PathBuf,
}

impl Default for RegistryAuth {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RegistryAuth {
    /// `$DOCKER_CONFIG/config.json`、未設定なら `~/.docker/config.json`
    pub fn from_env() -> Self {
        let dir = std::env::var_os("DOCKER_CONFIG")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".docker")))
            .unwrap_or_else(|| PathBuf::from(".docker"));
        Self::with_config_path(dir.join("config.json"))
    }

    pub fn with_config_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// イメージ参照の push 先レジストリの認証情報
    ///
    /// 見つからない場合は `None` (匿名で push を試みる)。
    pub fn credentials_for(&self, image: &str) -> Result<Option<DockerCredentials>> {
        if !self.config_path.is_file() {
            tracing::debug!("No docker config at {}", self.config_path.display());
            return Ok(None);
        }

        let host = registry_host(image);
        let config = self.load()?;
        let keys = lookup_keys(&host);

        for key in &keys {
            if let Some(encoded) = config.auths.get(*key).and_then(|e| e.auth.as_deref())
                && let Some(creds) = decode_basic(encoded, key)?
            {
                tracing::debug!("Using credentials from auths[{}]", key);
                return Ok(Some(creds));
            }
        }

        let helper = keys
            .iter()
            .find_map(|key| config.cred_helpers.get(*key))
            .or(config.creds_store.as_ref());
        if let Some(helper) = helper {
            // helper に渡すキーは auths と同じ表記
            let key = keys[0];
            match run_helper(helper, key) {
                Ok(Some(creds)) => return Ok(Some(creds)),
                Ok(None) => {}
                Err(e) => tracing::warn!("{}", e),
            }
        }

        tracing::debug!("No credentials for {}", host);
        Ok(None)
    }

    fn load(&self) -> Result<DockerConfigFile> {
        let content =
            std::fs::read_to_string(&self.config_path).map_err(|e| BuildError::AuthFailed {
                registry: self.config_path.display().to_string(),
                message: format!("Failed to read config.json: {}", e),
            })?;
        serde_json::from_str(&content).map_err(|e| BuildError::AuthFailed {
            registry: self.config_path.display().to_string(),
            message: format!("Failed to parse config.json: {}", e),
        })
    }
}

/// イメージ参照のレジストリホスト
///
/// 先頭要素が `.` か `:` を含むか `localhost` ならレジストリ、それ以外は Docker Hub。
pub fn registry_host(image: &str) -> String {
    match image.split_once('/') {
        Some((first, _)) if first.contains('.') || first.contains(':') || first == "localhost" => {
            first.to_string()
        }
        _ => "docker.io".to_string(),
    }
}

fn lookup_keys(host: &str) -> Vec<&str> {
    if host == "docker.io" {
        DOCKER_HUB_KEYS.to_vec()
    } else {
        vec![host]
    }
}

fn decode_basic(encoded: &str, registry: &str) -> Result<Option<DockerCredentials>> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| BuildError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Failed to decode auth: {}", e),
        })?;
    let decoded = String::from_utf8(decoded).map_err(|e| BuildError::AuthFailed {
        registry: registry.to_string(),
        message: format!("Invalid UTF-8 in auth: {}", e),
    })?;

    Ok(decoded
        .split_once(':')
        .map(|(username, password)| DockerCredentials {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            serveraddress: Some(registry.to_string()),
            ..Default::default()
        }))
}

fn run_helper(helper: &str, registry: &str) -> Result<Option<DockerCredentials>> {
    let program = format!("docker-credential-{}", helper);
    let failed = |message: String| BuildError::AuthFailed {
        registry: registry.to_string(),
        message,
    };

    let mut child = Command::new(&program)
        .arg("get")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| failed(format!("Failed to run {}: {}", program, e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(registry.as_bytes())
            .map_err(|e| failed(format!("Failed to write to {}: {}", program, e)))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| failed(format!("{} failed: {}", program, e)))?;
    if !output.status.success() {
        tracing::debug!(
            "{} has no credentials for {}: {}",
            program,
            registry,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return Ok(None);
    }

    let response: HelperResponse = serde_json::from_slice(&output.stdout)
        .map_err(|e| failed(format!("Unexpected {} response: {}", program, e)))?;
    Ok(Some(DockerCredentials {
        username: Some(response.username),
        password: Some(response.secret),
        serveraddress: Some(registry.to_string()),
        ..Default::default()
    }))
}
