//! Error types for the medseg workspace.

use thiserror::Error;

/// Main error type for augmentation and model configuration.
#[derive(Error, Debug)]
pub enum Error {
    /// Image and mask do not share the same spatial dimensions
    #[error("Shape mismatch: image {image:?} vs mask {mask:?}")]
    ShapeMismatch {
        image: Vec<usize>,
        mask: Vec<usize>,
    },

    /// Requested (family, backbone) pair is not in the model table
    #[error("Unknown model configuration: family '{family}', backbone '{backbone}'")]
    ConfigurationLookup { family: String, backbone: String },

    /// Constructor or config parameter out of its domain
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration file could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image conversion error
    #[error("Image processing error: {0}")]
    Image(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Builds a lookup error from anything printable.
    pub fn lookup(family: impl ToString, backbone: impl ToString) -> Self {
        Error::ConfigurationLookup {
            family: family.to_string(),
            backbone: backbone.to_string(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

/// Specialized Result type for medseg operations.
pub type Result<T> = std::result::Result<T, Error>;
