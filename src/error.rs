use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes reported error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration file: {source}")]
    ConfigParse {
        #[from]
        source: serde_yaml::Error,
    },

    #[error("failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid deletion_name_regexp: {source}")]
    Regex {
        #[from]
        source: regex::Error,
    },

    #[error("failed to parse timestamp: {source}")]
    Chrono {
        #[from]
        source: chrono::ParseError,
    },

    #[error("helm command failed: {0}")]
    Helm(String),

    #[error("json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("no config.yaml found in any of: {0:?}")]
    ConfigNotFound(Vec<String>),
}

pub type Result<T> = std::result::Result<T, Error>;
