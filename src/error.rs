//! Error taxonomy for the occupancy pipeline.

use thiserror::Error;

/// Result type alias used across the library.
pub type Result<T> = std::result::Result<T, CourtError>;

/// Errors produced by the pipeline, grouped by how far they propagate.
///
/// - Session-fatal: `ConfigLoadError`, `ModelLoadError`.
/// - Per-frame (frame dropped, pipeline continues): `FrameConversionError`, `InferenceError`.
/// - Per-update (pending state cleared, next cycle re-evaluates):
///   `TransactionConflict`, `NetworkError`, `RecordNotFound`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CourtError {
    #[error("configuration load failed: {0}")]
    ConfigLoadError(String),

    #[error("model load failed: {0}")]
    ModelLoadError(String),

    #[error("frame conversion failed: {0}")]
    FrameConversionError(String),

    #[error("inference failed: {0}")]
    InferenceError(String),

    #[error("transaction conflict: {0}")]
    TransactionConflict(String),

    #[error("store unreachable: {0}")]
    NetworkError(String),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("invalid court region: {0}")]
    InvalidRegion(String),
}

impl CourtError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigLoadError(msg.into())
    }

    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoadError(msg.into())
    }

    pub fn frame<S: Into<String>>(msg: S) -> Self {
        Self::FrameConversionError(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::InferenceError(msg.into())
    }

    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::TransactionConflict(msg.into())
    }

    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::NetworkError(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::RecordNotFound(msg.into())
    }

    pub fn region<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRegion(msg.into())
    }

    /// True when the error ends the viewing session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConfigLoadError(_) | Self::ModelLoadError(_))
    }
}

impl From<rusqlite::Error> for CourtError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, ref msg)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                Self::TransactionConflict(
                    msg.clone().unwrap_or_else(|| "database is busy".to_string()),
                )
            }
            other => Self::NetworkError(other.to_string()),
        }
    }
}
