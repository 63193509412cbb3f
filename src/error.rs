//! Error taxonomy shared by the index loader, the admin flow and the web layer.
//!
//! Every `Display` string is a one-line status message suitable for showing
//! directly to whoever triggered the action.

use std::path::PathBuf;
use thiserror::Error;

/// The review index could not be fetched or parsed.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read reviews from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "admin")]
    #[error("Failed to load reviews: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to load reviews: {status} {message}")]
    Status { status: u16, message: String },

    #[error("Failed to parse reviews: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to decode reviews: {0}")]
    Decode(String),

    #[error("Invalid review id 0: ids start at 1")]
    ZeroId,

    #[error("No review id left after {max}")]
    IdsExhausted { max: u32 },
}

/// A required admin form field is missing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Artist, album, and review are required.")]
    MissingFields(Vec<&'static str>),

    #[error("Cover file is required.")]
    MissingCover,
}

/// The blob store rejected or never received a write.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Failed to write {path}: {status} {message}")]
    Rejected {
        path: String,
        status: u16,
        message: String,
    },

    #[cfg(feature = "admin")]
    #[error("Failed to write {path}: {source}")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to encode reviews: {0}")]
    Encode(#[from] serde_json::Error),
}

impl WriteError {
    /// True when the store refused the write because the index changed underneath us.
    pub fn is_conflict(&self) -> bool {
        matches!(self, WriteError::Rejected { status: 409, .. })
    }
}

/// Anything that can stop a review submission.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Write(#[from] WriteError),
}
