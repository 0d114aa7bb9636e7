//! ビルド対象のデータモデル

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// タグ省略時のデフォルト
pub const DEFAULT_TAG: &str = "latest";

/// ビルド単位となるイメージ (`name:tag`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageSpec {
    pub name: String,
    pub tag: String,
}

impl ImageSpec {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
        }
    }

    /// レジストリ上のタグを組み立てる
    ///
    /// mainline ブランチでは `group/name:tag`、それ以外では
    /// `group/name:tag__<branch>` (ブランチ名の `/` は `-` に置換)。
    pub fn full_tag(&self, group: &str, branch: &str, mainline: &str) -> String {
        if branch == mainline {
            format!("{}/{}:{}", group, self.name, self.tag)
        } else {
            format!(
                "{}/{}:{}__{}",
                group,
                self.name,
                self.tag,
                branch_suffix(branch)
            )
        }
    }
}

impl FromStr for ImageSpec {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let (name, tag) = match s.split_once(':') {
            Some((name, tag)) => (name, tag),
            None => (s, DEFAULT_TAG),
        };

        if name.is_empty() || tag.is_empty() || name.contains('/') || tag.contains(':') {
            return Err(CoreError::InvalidImage(s.to_string()));
        }

        Ok(Self::new(name, tag))
    }
}

impl fmt::Display for ImageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// `os/arch` 形式のプラットフォーム識別子
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlatformId {
    pub os: String,
    pub arch: String,
}

impl PlatformId {
    /// ビルド対象として既知のプラットフォーム
    pub const KNOWN: [&'static str; 2] = ["linux/amd64", "linux/arm64"];

    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    pub fn linux(arch: impl Into<String>) -> Self {
        Self::new("linux", arch)
    }

    /// マシンアーキテクチャ名からプラットフォームを決定
    ///
    /// - `x86_64` / `AMD64` -> `linux/amd64`
    /// - `aarch64` / `arm64` -> `linux/arm64`
    pub fn from_machine(machine: &str) -> Result<Self> {
        match machine {
            "x86_64" | "AMD64" | "amd64" => Ok(Self::linux("amd64")),
            "aarch64" | "arm64" => Ok(Self::linux("arm64")),
            other => Err(CoreError::UnsupportedMachine(other.to_string())),
        }
    }

    /// 実行中ホストのネイティブプラットフォーム
    pub fn host() -> Result<Self> {
        Self::from_machine(std::env::consts::ARCH)
    }

    pub fn is_known(&self) -> bool {
        Self::KNOWN.contains(&self.to_string().as_str())
    }
}

impl FromStr for PlatformId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((os, arch)) if !os.is_empty() && !arch.is_empty() && !arch.contains('/') => {
                Ok(Self::new(os, arch))
            }
            _ => Err(CoreError::InvalidPlatform(s.to_string())),
        }
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// (イメージ × プラットフォーム) の1ジョブ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildJob {
    pub image: ImageSpec,
    pub platform: PlatformId,
    pub push: bool,
}

impl BuildJob {
    /// images × platforms の直積をイメージ優先の順序で展開
    pub fn expand(images: &[ImageSpec], platforms: &[PlatformId], push: bool) -> Vec<BuildJob> {
        images
            .iter()
            .flat_map(|image| {
                platforms.iter().map(move |platform| BuildJob {
                    image: image.clone(),
                    platform: platform.clone(),
                    push,
                })
            })
            .collect()
    }
}

impl fmt::Display for BuildJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.image, self.platform)
    }
}

/// ブランチ名をタグに使える形にする
pub fn branch_suffix(branch: &str) -> String {
    branch.replace('/', "-")
}

/// アーキテクチャ修飾タグ (`<full_tag>__<arch>`)
pub fn arch_tag(full_tag: &str, platform: &PlatformId) -> String {
    format!("{}__{}", full_tag, platform.arch)
}

/// イメージ名とタグを分離
///
/// # Examples
/// - `group/app:v1.0` -> `("group/app", "v1.0")`
/// - `group/app` -> `("group/app", "latest")`
/// - `localhost:5000/app` -> `("localhost:5000/app", "latest")`
pub fn split_image_tag(image: &str) -> (&str, &str) {
    if let Some(pos) = image.rfind(':') {
        let potential_tag = &image[pos + 1..];
        // ポート番号は / を含まない純粋な数字
        if !potential_tag.contains('/') && !potential_tag.chars().all(|c| c.is_ascii_digit()) {
            return (&image[..pos], potential_tag);
        }
    }

    (image, DEFAULT_TAG)
}
