use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "設定ファイルが見つかりません。archfleet.kdl を含むディレクトリで実行するか、\
        ARCHFLEET_CONFIG_PATH 環境変数で直接指定してください"
    )]
    ConfigNotFound,

    #[error("KDL パースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("不正な設定: {0}")]
    InvalidConfig(String),

    #[error("image '{0}' が重複しています")]
    DuplicateImage(String),

    #[error("image '{image}' の component '{component}' が重複しています")]
    DuplicateComponent { image: String, component: String },

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
