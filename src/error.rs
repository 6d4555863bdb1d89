use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("File watch error: {0}")]
    Notify(#[from] notify::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown activity: {0}")]
    UnknownActivity(String),

    #[error("Unknown scene: {0}")]
    UnknownScene(String),

    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
