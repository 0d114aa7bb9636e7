//! マニフェストリストのモデル

use crate::error::{RegistryError, Result};
use archfleet_core::{PlatformId, split_image_tag};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Docker マニフェストリストのメディアタイプ
pub const MANIFEST_LIST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub platform: PlatformId,
    pub digest: String,
}

impl ManifestEntry {
    pub fn new(platform: PlatformId, digest: impl Into<String>) -> Self {
        Self {
            platform,
            digest: digest.into(),
        }
    }
}

/// `repo:tag` のマニフェストリストのスナップショット
///
/// エントリはプラットフォームをキーとする集合で、1プラットフォームにつき
/// 1エントリしか持たない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestList {
    pub repo_tag: String,
    entries: BTreeMap<PlatformId, String>,
    /// 取得時のマニフェストダイジェスト (`Docker-Content-Digest`)
    pub version: Option<String>,
}

impl ManifestList {
    /// 初回公開時など、既存リストが無い状態
    pub fn empty(repo_tag: impl Into<String>) -> Self {
        Self {
            repo_tag: repo_tag.into(),
            entries: BTreeMap::new(),
            version: None,
        }
    }

    pub fn from_entries(
        repo_tag: impl Into<String>,
        entries: impl IntoIterator<Item = ManifestEntry>,
    ) -> Self {
        let mut list = Self::empty(repo_tag);
        for entry in entries {
            list.put(entry);
        }
        list
    }

    /// 同じプラットフォームのエントリは置き換える
    pub fn put(&mut self, entry: ManifestEntry) -> Option<String> {
        self.entries.insert(entry.platform, entry.digest)
    }

    pub fn digest(&self, platform: &PlatformId) -> Option<&str> {
        self.entries.get(platform).map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = ManifestEntry> + '_ {
        self.entries
            .iter()
            .map(|(platform, digest)| ManifestEntry::new(platform.clone(), digest.clone()))
    }

    pub fn platforms(&self) -> impl Iterator<Item = &PlatformId> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// プラットフォーム → ダイジェストの対応 (比較用)
    pub fn mapping(&self) -> &BTreeMap<PlatformId, String> {
        &self.entries
    }

    pub fn repo(&self) -> &str {
        split_image_tag(&self.repo_tag).0
    }

    /// `docker manifest create` に渡す `repo@digest` の一覧
    pub fn digest_refs(&self) -> Vec<String> {
        let repo = self.repo();
        self.entries
            .values()
            .map(|digest| format!("{}@{}", repo, digest))
            .collect()
    }

    /// レジストリのレスポンスをデコードする
    ///
    /// `media_type` はレスポンスヘッダの値。無い場合は本文の `mediaType` を使う。
    pub fn decode(repo_tag: &str, media_type: Option<&str>, body: &[u8]) -> Result<Self> {
        let wire: WireManifestList = serde_json::from_slice(body)?;

        let media_type = media_type
            .map(|m| m.split(';').next().unwrap_or(m).trim().to_string())
            .or(wire.media_type)
            .unwrap_or_default();
        if media_type != MANIFEST_LIST_MEDIA_TYPE {
            return Err(RegistryError::UnsupportedMediaType(media_type));
        }

        let mut list = Self::empty(repo_tag);
        for descriptor in wire.manifests {
            let platform = PlatformId::new(descriptor.platform.os, descriptor.platform.architecture);
            if list.entries.contains_key(&platform) {
                tracing::warn!(
                    "{} lists {} more than once; keeping the first entry",
                    repo_tag,
                    platform
                );
                continue;
            }
            list.entries.insert(platform, descriptor.digest);
        }

        Ok(list)
    }
}

#[derive(Debug, Deserialize)]
struct WireManifestList {
    #[serde(rename = "mediaType")]
    media_type: Option<String>,
    #[serde(default)]
    manifests: Vec<WireDescriptor>,
}

#[derive(Debug, Deserialize)]
struct WireDescriptor {
    digest: String,
    platform: WirePlatform,
}

#[derive(Debug, Deserialize)]
struct WirePlatform {
    os: String,
    architecture: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = r#"{
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.list.v2+json",
        "manifests": [
            {
                "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
                "size": 1152,
                "digest": "sha256:aaa",
                "platform": { "architecture": "amd64", "os": "linux" }
            },
            {
                "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
                "size": 1152,
                "digest": "sha256:bbb",
                "platform": { "architecture": "arm64", "os": "linux", "variant": "v8" }
            }
        ]
    }"#;

    #[test]
    fn test_decode_manifest_list() {
        let list = ManifestList::decode(
            "group/proxy:latest",
            Some("application/vnd.docker.distribution.manifest.list.v2+json"),
            LIST.as_bytes(),
        )
        .unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(list.digest(&PlatformId::linux("amd64")), Some("sha256:aaa"));
        assert_eq!(list.digest(&PlatformId::linux("arm64")), Some("sha256:bbb"));
    }

    #[test]
    fn test_decode_uses_body_media_type_without_header() {
        let list = ManifestList::decode("group/proxy:latest", None, LIST.as_bytes()).unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_decode_rejects_single_manifest() {
        let body = r#"{"schemaVersion":2,"mediaType":"application/vnd.docker.distribution.manifest.v2+json"}"#;
        let err = ManifestList::decode("group/proxy:latest", None, body.as_bytes()).unwrap_err();
        assert!(matches!(err, RegistryError::UnsupportedMediaType(_)));
    }

    #[test]
    fn test_decode_rejects_header_media_type() {
        let err = ManifestList::decode(
            "group/proxy:latest",
            Some("application/vnd.oci.image.index.v1+json"),
            LIST.as_bytes(),
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::UnsupportedMediaType(_)));
    }

    #[test]
    fn test_decode_keeps_first_duplicate_platform() {
        let body = r#"{
            "mediaType": "application/vnd.docker.distribution.manifest.list.v2+json",
            "manifests": [
                { "digest": "sha256:v7", "platform": { "os": "linux", "architecture": "arm", "variant": "v7" } },
                { "digest": "sha256:v6", "platform": { "os": "linux", "architecture": "arm", "variant": "v6" } }
            ]
        }"#;
        let list = ManifestList::decode("g/a:latest", None, body.as_bytes()).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.digest(&PlatformId::linux("arm")), Some("sha256:v7"));
    }

    #[test]
    fn test_put_replaces_platform() {
        let mut list = ManifestList::from_entries(
            "g/a:latest",
            [ManifestEntry::new(PlatformId::linux("amd64"), "sha256:old")],
        );
        let previous = list.put(ManifestEntry::new(PlatformId::linux("amd64"), "sha256:new"));

        assert_eq!(previous.as_deref(), Some("sha256:old"));
        assert_eq!(list.len(), 1);
        assert_eq!(list.digest(&PlatformId::linux("amd64")), Some("sha256:new"));
    }

    #[test]
    fn test_digest_refs() {
        let list = ManifestList::from_entries(
            "group/proxy:latest__feature-x",
            [
                ManifestEntry::new(PlatformId::linux("arm64"), "sha256:b"),
                ManifestEntry::new(PlatformId::linux("amd64"), "sha256:a"),
            ],
        );
        assert_eq!(list.repo(), "group/proxy");
        assert_eq!(
            list.digest_refs(),
            vec!["group/proxy@sha256:a", "group/proxy@sha256:b"]
        );
    }
}
