use thiserror::Error;
use regex::Error as RegexError;
use serde_json::Error as JsonError;
use std::io::Error as IoError;
use tokio::task::JoinError;
use toml::de::Error as TomlError;

/// Errors raised while building or operating the pipeline itself.
///
/// Validation outcomes are never reported through this type; they are
/// `Verdict::Reject` values. A `GuardError` means the guard could not be
/// set up (bad configuration, unreadable file) or a worker died.
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] TomlError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] JsonError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid forbidden rule '{id}': {source}")]
    InvalidRule {
        id: String,
        #[source]
        source: RegexError,
    },

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Resolution worker failed: {0}")]
    Worker(#[from] JoinError),
}

pub type Result<T> = std::result::Result<T, GuardError>;
