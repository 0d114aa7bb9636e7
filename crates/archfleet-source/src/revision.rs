//! 解決済みソースの表現

use std::collections::BTreeMap;
use std::path::PathBuf;

/// override で使うローカルソースの revision 表記
pub const LOCAL_REVISION: &str = "local";

/// 1コンポーネント分の解決結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRevision {
    pub component: String,
    /// upstream の ref (例: `main`, `v1.0.0`)
    pub reference: String,
    /// コミットハッシュ。override 時は [`LOCAL_REVISION`]
    pub revision: String,
    /// override されたローカルソース
    pub local: Option<PathBuf>,
}

/// イメージ1バージョン分のソーススナップショット
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRevision {
    pub image: String,
    pub version: String,
    /// コンポーネント名でソート済み
    pub components: Vec<ComponentRevision>,
}

impl SourceRevision {
    pub fn new(
        image: impl Into<String>,
        version: impl Into<String>,
        mut components: Vec<ComponentRevision>,
    ) -> Self {
        components.sort_by(|a, b| a.component.cmp(&b.component));
        Self {
            image: image.into(),
            version: version.into(),
            components,
        }
    }

    /// `component:revision,component:revision` 形式のフィンガープリント
    pub fn fingerprint(&self) -> String {
        self.components
            .iter()
            .map(|c| format!("{}:{}", c.component, c.revision))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// ビルド引数 (`<COMPONENT>_REVISION` と `SOURCE_REVISION`)
    pub fn build_args(&self) -> BTreeMap<String, String> {
        let mut args: BTreeMap<String, String> = self
            .components
            .iter()
            .map(|c| {
                let key = format!(
                    "{}_REVISION",
                    c.component.to_ascii_uppercase().replace('-', "_")
                );
                (key, c.revision.clone())
            })
            .collect();
        if !self.components.is_empty() {
            args.insert("SOURCE_REVISION".to_string(), self.fingerprint());
        }
        args
    }
}

/// materialize の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    /// 作業チェックアウトのルート
    pub path: PathBuf,
    pub build_args: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(name: &str, revision: &str) -> ComponentRevision {
        ComponentRevision {
            component: name.to_string(),
            reference: "main".to_string(),
            revision: revision.to_string(),
            local: None,
        }
    }

    #[test]
    fn test_fingerprint_sorted_by_component() {
        let rev = SourceRevision::new(
            "proxy",
            "latest",
            vec![component("frontend", "f00d"), component("backend", "beef")],
        );
        assert_eq!(rev.fingerprint(), "backend:beef,frontend:f00d");
    }

    #[test]
    fn test_build_args() {
        let rev = SourceRevision::new(
            "proxy",
            "latest",
            vec![component("web-ui", "f00d"), component("backend", "beef")],
        );
        let args = rev.build_args();
        assert_eq!(args.get("WEB_UI_REVISION").map(String::as_str), Some("f00d"));
        assert_eq!(args.get("BACKEND_REVISION").map(String::as_str), Some("beef"));
        assert_eq!(
            args.get("SOURCE_REVISION").map(String::as_str),
            Some("backend:beef,web-ui:f00d")
        );
    }

    #[test]
    fn test_build_args_empty() {
        let rev = SourceRevision::new("utils-free", "latest", Vec::new());
        assert!(rev.build_args().is_empty());
        assert_eq!(rev.fingerprint(), "");
    }
}
