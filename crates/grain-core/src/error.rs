//! Error types for the grain classification pipeline.
//!
//! Every error is fatal to a run: library code propagates it with `?` and the
//! tools turn it into a non-zero exit.

use thiserror::Error;

/// Main error type for the grain pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding error
    #[error("Image processing error: {0}")]
    Image(String),

    /// Wrong or missing dataset paths, mismatched class sets, bad parameters
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pretrained component could not be fetched or loaded
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Corrupt or incompatible saved model, unresolved component reference
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Model construction or tensor conversion error
    #[error("Model error: {0}")]
    Model(String),

    /// Training loop error
    #[error("Training error: {0}")]
    Training(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

/// Specialized Result type for grain pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
