// rust/shard-core/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {

    #[error("Input manifest line {line}: {message}")]
    Input {
        line: usize,
        message: String,
    },

    #[error("Failed to decode audio for '{key}': {message}")]
    Decode {
        key: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Format error in '{path}': {message}")]
    Format {
        path: PathBuf,
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Storage error at '{path}': {message}")]
    Storage {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, DataError>;

// Convenience constructors
impl DataError {

    pub fn input(line: usize, message: impl Into<String>) -> Self {
        Self::Input {
            line,
            message: message.into(),
        }
    }

    pub fn decode(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            key: key.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn decode_with_source(
        key: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Decode {
            key: key.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Attaches a key to a decode error raised by a collaborator that did not
    /// know which record it was working on.
    pub fn with_key(self, key: &str) -> Self {
        match self {
            Self::Decode {
                key: k,
                message,
                source,
            } if k.is_empty() => Self::Decode {
                key: key.to_string(),
                message,
                source,
            },
            other => other,
        }
    }
}
