//! Error types for bracket construction, recomputation and storage.

use thiserror::Error;

use crate::bracket::MatchupKey;
use crate::types::{AllianceId, MatchId};

pub type Result<T> = std::result::Result<T, BracketError>;

/// Failures raised by a match store implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("match {0} does not exist")]
    MissingMatch(MatchId),
}

#[derive(Error, Debug)]
pub enum BracketError {
    /// Unsupported format/size or a structurally invalid topology table.
    #[error("{0}")]
    Configuration(String),

    /// A resolved alliance id is missing from the store.
    #[error("alliance {0} does not exist in the database")]
    ReferenceIntegrity(AllianceId),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("no matchup exists at round {} group {}", .0.round, .0.group)]
    NotFound(MatchupKey),
}
