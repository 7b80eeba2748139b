//! Error types for the Tether engine.

use thiserror::Error;

/// All possible errors from the Tether engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid event payload: {0}")]
    InvalidPayload(String),

    #[error("event payload missing field: {0}")]
    MissingField(&'static str),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
