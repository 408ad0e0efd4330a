//! Error types for the store, its configuration, and the fetch capability.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the local store.
///
/// Every variant is surfaced to the caller immediately; nothing in the store
/// retries.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Bad store root, or a HUC8/product code that is not well-formed.
    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    /// A fetch result is missing metadata the index depends on.
    #[error("Malformed fetch result: {0}")]
    MalformedFetchResult(String),

    /// Reading or writing a store file failed.
    #[error("Persistence error at {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A store file exists but could not be decoded or encoded.
    #[error("Corrupt store file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A query referenced a site absent from the index.
    #[error("Unknown site: {0}")]
    UnknownSite(String),

    /// A query requested a column the index does not have.
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// The index references a HUC8 whose data file is absent.
    #[error("Missing data file for HUC {huc}: {path}")]
    MissingDataFile { huc: String, path: PathBuf },
}

impl StoreError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Persistence {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        StoreError::Corrupt {
            path: path.into(),
            source,
        }
    }
}

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for '{key}': {message}")]
    Invalid { key: String, message: String },
}

/// Errors from the remote fetch capability.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-2xx HTTP response from the remote service.
    #[error("HTTP error: {0}")]
    Http(u16),

    /// The request could not be sent or the body could not be read.
    #[error("Request failed: {0}")]
    Transport(String),

    /// The response body could not be deserialized.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The response parsed but contained no usable series.
    #[error("No data available for HUC {0}")]
    NoDataAvailable(String),

    /// The fetched data could not be saved.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FetchError {
    /// Whether the caller may reasonably retry the fetch.
    ///
    /// Server-side and transport failures are retryable; malformed responses
    /// and store failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Http(code) => *code >= 500 || *code == 429,
            FetchError::Transport(_) => true,
            FetchError::Parse(_) | FetchError::NoDataAvailable(_) | FetchError::Store(_) => false,
        }
    }
}
