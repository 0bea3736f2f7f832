//! Error types for the Glitch engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum GlitchError {
    /// Configuration error (bad tempo, tick interval, FFT size, ...)
    #[error("configuration error: {0}")]
    Config(String),

    /// Pattern table error
    #[error("pattern error: {0}")]
    Pattern(String),

    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using GlitchError
pub type Result<T> = std::result::Result<T, GlitchError>;
