use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while opening or parsing one input source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}': {source}")]
    Parse { path: PathBuf, source: csv::Error },

    #[error("'{path}' line {line}: found {found} fields, header has {expected}")]
    TooManyFields {
        path: PathBuf,
        line: u64,
        found: usize,
        expected: usize,
    },
}

/// Errors from a single download attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("Timed out after {0:?} waiting for the server")]
    Timeout(Duration),

    #[error("{operation} '{path}': {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors from the tracking file.
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("Tracking file '{path}' is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize tracking data: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{operation} '{path}': {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Cannot create output directory '{path}': {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot list input directory '{path}': {source}")]
    Discover {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Tracking(#[from] TrackingError),
}
