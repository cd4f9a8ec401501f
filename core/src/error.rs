//! Error type shared by every stage of the topic model.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while fitting, transforming, persisting or querying a model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Persisted data is malformed or carries an unknown format tag.
    #[error("format error: {0}")]
    Format(String),

    /// A matrix does not have the column count the model was fitted with.
    #[error("input has n_features={found} while the model has been trained with n_features={expected}")]
    DimensionMismatch {
        /// Column count established at fit time.
        expected: usize,
        /// Column count of the offending input.
        found: usize,
    },

    /// A matrix shape is unusable, e.g. it has no columns.
    #[error("dimension error: {0}")]
    Dimension(String),

    /// IDF weighting was requested from a transformer that was never fitted.
    #[error("idf vector is not fitted")]
    NotFitted,

    /// No terms survived vocabulary pruning (or the corpus was empty).
    #[error("after pruning, no terms remain; try a lower min_df or a higher max_df")]
    EmptyVocabulary,

    /// A configuration value is out of range or unrecognized.
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// Matrix rows, metadata rows and vocabulary disagree in size.
    #[error("model parts are misaligned: {0}")]
    Misaligned(String),

    /// A topic title or row index does not exist in the metadata table.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("binary encoding error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter { name, message: message.into() }
    }
}
