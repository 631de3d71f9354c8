//! Error types for the occupancy core

/// Result type alias
pub type Result<T> = std::result::Result<T, OccupancyError>;

/// Errors surfaced by region configuration
///
/// Unknown track ids are never an error: a new id simply starts Outside.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OccupancyError {
    /// Wrong point count or malformed coordinates on a region write.
    /// The previously active region is retained.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl OccupancyError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        OccupancyError::InvalidConfiguration(reason.into())
    }
}
