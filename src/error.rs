use std::io;
use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Failures at the I/O seams around the parsing core.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("store error at {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("narrative generation failed: {0}")]
    Narrative(String),
    #[error("chat transport failed: {0}")]
    Transport(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ReportError>;

/// Why a date string could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    #[error("'{0}' is not a recognised date (use DD/MM/YYYY, YYYY-MM-DD, today or yesterday)")]
    Invalid(String),
    #[error("{0} is in the future")]
    Future(NaiveDate),
}
