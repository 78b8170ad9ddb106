//! Error types for storage queries and location input.

use thiserror::Error;

/// A read query against the activity store failed.
///
/// The recommendation and nearby paths never propagate this; a failing
/// source is logged and treated as empty.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The store could not be reached
    #[error("Activity store unavailable: {0}")]
    Unavailable(String),

    /// The store was reached but the query itself failed
    #[error("Query '{query}' failed: {message}")]
    Query { query: &'static str, message: String },
}

/// A user-submitted location could not be accepted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    #[error("Missing latitude or longitude")]
    Missing,

    #[error("Invalid coordinate '{0}': not a number")]
    NotANumber(String),

    #[error(
        "Coordinates out of range: ({latitude}, {longitude}). \
         Latitude must be within [-90, 90] and longitude within [-180, 180]."
    )]
    OutOfRange { latitude: f64, longitude: f64 },
}
