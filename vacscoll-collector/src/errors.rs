use std::path::PathBuf;
use thiserror::Error;
use vacscoll_http::HttpError;

/// One URL could not be fetched or decoded.
#[derive(Debug, Error)]
#[error("fetch failed for {url}: {source}")]
pub struct FetchError {
    pub url: String,
    #[source]
    pub source: HttpError,
}

impl FetchError {
    pub fn new(url: impl Into<String>, source: HttpError) -> Self {
        Self {
            url: url.into(),
            source,
        }
    }

    /// The body arrived but did not have the expected shape.
    pub fn shape(url: impl Into<String>, err: serde_json::Error) -> Self {
        Self::new(url, HttpError::Decode(err.to_string(), String::new()))
    }
}

/// The seen-id store could not be opened, read, or written.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("store directory {path} unavailable: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store {path} failed: {source}")]
    Sqlite {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },
}

/// Per-item problems; the item is skipped, never the batch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("vacancy payload is empty")]
    EmptySource,
    #[error("vacancy payload has no usable id")]
    MissingId,
    #[error("vacancy payload is malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("invalid collector configuration: {0}")]
    Validation(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T, E = CollectError> = std::result::Result<T, E>;
