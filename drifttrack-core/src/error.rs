//! Error types for drifttrack-core.

use thiserror::Error;

/// Result type alias for drifttrack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors of the digitization and reconstruction chain.
///
/// Per-entity failures (a fit stage that does not converge, a wire that
/// collected no charge) are never reported through this type; they are
/// recorded on the entity itself.
#[derive(Error, Debug)]
pub enum Error {
    /// The requested detector sub-path is not part of the geometry.
    #[error("geometry path '{0}' cannot be resolved")]
    GeometryPathUnresolved(String),

    /// The geometry description is inconsistent.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A channel id that has no wire behind it.
    #[error("no wire corresponds to channel {0}")]
    UnknownChannel(crate::ChannelId),

    /// Malformed or missing truth-hit input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
