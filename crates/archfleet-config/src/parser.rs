//! archfleet.kdl パーサー

use crate::error::{ConfigError, Result};
use crate::model::{
    ComponentRecipe, Config, FetchStrategy, ImageRecipe, ProjectConfig, RegistryConfig,
};
use kdl::{KdlDocument, KdlNode};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// ビルド対象にできない予約済みのイメージ名
const RESERVED_IMAGE: &str = "utils";

/// KDLファイルを Config にパース
pub fn parse_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let root = path.parent().unwrap_or_else(|| Path::new("."));
    parse_config(&content, root)
}

/// KDL文字列を Config にパース
pub fn parse_config(content: &str, root: &Path) -> Result<Config> {
    let doc: KdlDocument = content.parse()?;

    let mut project: Option<ProjectConfig> = None;
    let mut registry = RegistryConfig::default();
    let mut images = BTreeMap::new();

    for node in doc.nodes() {
        match node.name().value() {
            "project" => project = Some(parse_project(node)?),
            "registry" => registry = parse_registry(node),
            "image" => {
                let recipe = parse_image(node)?;
                if images.contains_key(&recipe.name) {
                    return Err(ConfigError::DuplicateImage(recipe.name));
                }
                images.insert(recipe.name.clone(), recipe);
            }
            other => {
                tracing::debug!("Skipping unknown node: {}", other);
            }
        }
    }

    let project = project
        .ok_or_else(|| ConfigError::InvalidConfig("project ノードが必要です".to_string()))?;

    Ok(Config {
        root: root.to_path_buf(),
        project,
        registry,
        images,
    })
}

/// 最初の位置引数を文字列として取得
fn first_string(node: &KdlNode) -> Option<String> {
    positional(node).first().map(|s| s.to_string())
}

/// 名前なしエントリの文字列値
fn positional(node: &KdlNode) -> Vec<&str> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .collect()
}

fn required_string(node: &KdlNode, what: &str) -> Result<String> {
    first_string(node).ok_or_else(|| {
        ConfigError::InvalidConfig(format!("{} には文字列の値が必要です", what))
    })
}

fn parse_project(node: &KdlNode) -> Result<ProjectConfig> {
    let mut project = ProjectConfig {
        name: first_string(node).unwrap_or_default(),
        ..Default::default()
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "group" => project.group = required_string(child, "group")?,
                "label-prefix" => project.label_prefix = first_string(child),
                "mainline" => project.mainline = required_string(child, "mainline")?,
                "remote" => project.remote = required_string(child, "remote")?,
                "cache-dir" => project.cache_dir = first_string(child).map(PathBuf::from),
                "concurrency" => {
                    let value = child
                        .entries()
                        .first()
                        .and_then(|e| e.value().as_integer())
                        .ok_or_else(|| {
                            ConfigError::InvalidConfig(
                                "concurrency には整数が必要です".to_string(),
                            )
                        })?;
                    if value < 1 {
                        return Err(ConfigError::InvalidConfig(format!(
                            "concurrency は 1 以上である必要があります: {}",
                            value
                        )));
                    }
                    project.concurrency = usize::try_from(value).map_err(|_| {
                        ConfigError::InvalidConfig(format!("concurrency が大きすぎます: {}", value))
                    })?;
                }
                _ => {}
            }
        }
    }

    if project.group.is_empty() {
        return Err(ConfigError::InvalidConfig(
            "project に group が必要です".to_string(),
        ));
    }

    Ok(project)
}

fn parse_registry(node: &KdlNode) -> RegistryConfig {
    let mut registry = RegistryConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let Some(value) = first_string(child) else {
                continue;
            };
            match child.name().value() {
                "url" => registry.url = value.trim_end_matches('/').to_string(),
                "auth" => registry.auth = value,
                "service" => registry.service = value,
                _ => {}
            }
        }
    }

    registry
}

fn parse_image(node: &KdlNode) -> Result<ImageRecipe> {
    let name = required_string(node, "image")?;
    if name == RESERVED_IMAGE {
        return Err(ConfigError::InvalidConfig(format!(
            "'{}' は予約済みのイメージ名です",
            RESERVED_IMAGE
        )));
    }

    let mut recipe = ImageRecipe {
        name: name.clone(),
        components: Vec::new(),
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() != "component" {
                continue;
            }
            let component = parse_component(child, &name)?;
            if recipe.components.iter().any(|c| c.name == component.name) {
                return Err(ConfigError::DuplicateComponent {
                    image: name,
                    component: component.name,
                });
            }
            recipe.components.push(component);
        }
    }

    Ok(recipe)
}

fn parse_component(node: &KdlNode, image: &str) -> Result<ComponentRecipe> {
    let mut component = ComponentRecipe {
        name: required_string(node, "component")?,
        ..Default::default()
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "repo" => component.repo = required_string(child, "repo")?,
                "latest" => component.latest = required_string(child, "latest")?,
                "alias" => {
                    let args = positional(child);
                    let [version, reference] = args.as_slice() else {
                        return Err(ConfigError::InvalidConfig(format!(
                            "image '{}' の alias には \"<version>\" \"<ref>\" が必要です",
                            image
                        )));
                    };
                    component
                        .aliases
                        .insert(version.to_string(), reference.to_string());
                }
                "fetch" => {
                    component.fetch = match required_string(child, "fetch")?.as_str() {
                        "archive" => FetchStrategy::Archive,
                        "git" => FetchStrategy::Git,
                        other => {
                            return Err(ConfigError::InvalidConfig(format!(
                                "不明な fetch 方式です: {}",
                                other
                            )));
                        }
                    }
                }
                "archive" => component.archive = first_string(child),
                "override-env" => component.override_env = first_string(child),
                _ => {}
            }
        }
    }

    if component.repo.is_empty() || component.latest.is_empty() {
        return Err(ConfigError::InvalidConfig(format!(
            "image '{}' の component '{}' には repo と latest が必要です",
            image, component.name
        )));
    }

    Ok(component)
}
