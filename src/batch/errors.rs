use std::path::PathBuf;

use thiserror::Error;

use crate::drafting::llm::ChatServiceError;
use crate::validation::{EngineError, LoopError};

/// Errors that stop a conversion run. Per-item failures never surface here;
/// they are written to the failure stream instead.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("validation engine failed: {0}")]
    Engine(#[from] EngineError),

    #[error("text-completion service failed: {0}")]
    Chat(#[from] ChatServiceError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error on {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("schema for '{database}' is not usable: {reason}")]
    Schema { database: String, reason: String },

    #[error("interrupted; progress has been saved; re-run to resume")]
    Interrupted,
}

impl From<LoopError> for ConversionError {
    fn from(err: LoopError) -> Self {
        match err {
            LoopError::Engine(e) => ConversionError::Engine(e),
            LoopError::Chat(e) => ConversionError::Chat(e),
        }
    }
}

impl ConversionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConversionError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        ConversionError::Csv {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        ConversionError::Json {
            path: path.into(),
            source,
        }
    }

    /// True when the run stopped in a resumable state.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            ConversionError::Engine(_) | ConversionError::Chat(_) | ConversionError::Interrupted
        )
    }
}
