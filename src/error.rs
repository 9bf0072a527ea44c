use std::path::PathBuf;

use thiserror::Error;

/// Everything that can stop a reconstruction run before it produces output.
///
/// Numeric anomalies (nan/inf in the estimate) are deliberately absent: they
/// are reported through [`crate::mlem::AnomalyReport`] and never abort a run.
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("invalid parameters in {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("malformed parameter file {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path:?} is truncated: expected {expected} bytes, found {found}")]
    Truncated {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("unexpected contents in {path:?}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("cannot read array archive {path:?}: {source}")]
    NpzRead {
        path: PathBuf,
        #[source]
        source: ndarray_npy::ReadNpzError,
    },

    #[error("cannot write array archive {path:?}: {source}")]
    NpzWrite {
        path: PathBuf,
        #[source]
        source: ndarray_npy::WriteNpzError,
    },

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, ReconError>;

impl ReconError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Format { path: path.into(), reason: reason.into() }
    }
}
