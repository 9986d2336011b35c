//! Configuration-string errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("configuration string is missing its {key} header field")]
    MissingHeader { key: &'static str },

    #[error("invalid hex data at position {position}")]
    InvalidHex { position: usize },

    #[error("unexpected `{key}` at position {position}")]
    Unexpected { key: String, position: usize },

    #[error("element at position {position} lies outside the {size}-byte block")]
    OutOfRange { position: usize, size: usize },

    #[error("value at position {position} is wider than {width} bytes")]
    ValueTooWide { position: usize, width: usize },

    #[error("name element `{name}` cannot address a block")]
    NotBlock { name: String },
}

impl ConfigError {
    /// The progress marker: byte offset of the first element that could not
    /// be processed, when the error is tied to one.
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::InvalidHex { position }
            | Self::Unexpected { position, .. }
            | Self::OutOfRange { position, .. }
            | Self::ValueTooWide { position, .. } => Some(*position),
            Self::MissingHeader { .. } | Self::NotBlock { .. } => None,
        }
    }
}

/// Result alias for configuration-string operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
