//! Error types for quakemap.
//!
//! Uses `thiserror` for library-style error definitions.

use thiserror::Error;

/// Errors that can occur while fetching and decoding the feeds.
#[derive(Error, Debug)]
pub enum QuakemapError {
    /// HTTP transport failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("Failed to parse JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// A feed answered with a non-success status
    #[error("network response was not ok (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The token collaborator could not supply a token
    #[error("failed to acquire access token: {0}")]
    Token(String),

    /// The boundary topology could not be turned into counties
    #[error("invalid topology: {0}")]
    Topology(String),
}

/// Rejected row or marker clicks.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectionError {
    /// The click was made against a list that has since been replaced
    #[error("stale selection: generation {requested}, current is {current}")]
    Stale { requested: u64, current: u64 },

    /// No event at that index
    #[error("no earthquake at index {index} (list has {len})")]
    OutOfRange { index: usize, len: usize },
}
