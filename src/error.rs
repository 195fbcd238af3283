use thiserror::Error;

/// Failure taxonomy shared by the logic layer and the HTTP surface.
///
/// A property that exists but holds no value is not an error; the resolver
/// reports it as `PropertyOutcome::NoContent`.
#[derive(Debug, Error)]
pub enum AirVinylError {
    /// Unknown key, unknown property or an unresolvable target entity
    #[error("{0}")]
    NotFound(String),
    /// The link being added already exists
    #[error("{0}")]
    Conflict(String),
    /// Malformed input, rejected before any mutation is attempted
    #[error("{0}")]
    ValidationFailed(String),
    /// An entity reference that does not point at a concrete keyed resource
    #[error("Invalid entity reference '{0}'")]
    InvalidReference(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl AirVinylError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }
}

pub type AirVinylResult<T> = std::result::Result<T, AirVinylError>;
