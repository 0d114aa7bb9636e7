//! archfleet プロジェクト設定
//!
//! `archfleet.kdl` の発見とパースを行う。

pub mod discovery;
pub mod error;
pub mod model;
pub mod parser;

pub use discovery::{CONFIG_FILENAME, CONFIG_PATH_ENV, find_config, find_config_from, load_config};
pub use error::{ConfigError, Result};
pub use model::*;
pub use parser::{parse_config, parse_config_file};
