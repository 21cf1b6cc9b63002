use thiserror::Error;

use crate::data::SessionKind;

pub type Result<T> = std::result::Result<T, PaceError>;

#[derive(Debug, Error)]
pub enum PaceError {
    /// Session data for an event could not be retrieved.
    #[error("cannot retrieve {kind} for {event}: {reason}")]
    Retrieval {
        event: String,
        kind: SessionKind,
        reason: String,
    },

    /// Not enough data to compute a cutoff or a pace reference.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Driver code or team name missing from the reference tables.
    #[error("unknown identity: {0}")]
    UnknownIdentity(String),

    /// Reference tables disagree with themselves, or a downforce query is
    /// outside 1..=9.
    #[error("invalid reference data: {0}")]
    InvalidReference(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
}
