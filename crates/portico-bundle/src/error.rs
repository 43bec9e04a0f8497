//! Bundle errors

use thiserror::Error;

/// Errors produced while writing or reading bundle XML
#[derive(Debug, Error)]
pub enum BundleError {
    /// The bundle could not be serialized
    #[error("bundle serialization failed: {0}")]
    Serialize(String),

    /// A bundle document could not be parsed
    #[error("bundle parse failed: {0}")]
    Parse(String),
}
