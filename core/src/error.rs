use thiserror::Error;

use crate::container::HEADER_LEN;

#[derive(Debug, Error)]
pub enum MorseError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed audio container: {0}")]
    Format(#[from] FormatError),
}

/// Reasons a byte stream is not a usable mono PCM container
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("container truncated: {len} bytes, header needs {HEADER_LEN}")]
    Truncated { len: usize },

    #[error("missing {expected:?} tag at offset {offset}")]
    BadTag { expected: &'static str, offset: usize },

    #[error("unsupported encoding tag {0} (only linear PCM is supported)")]
    UnsupportedEncoding(u16),

    #[error("unsupported channel count {0} (mono only)")]
    UnsupportedChannels(u16),

    #[error("unsupported sample width of {0} bits")]
    UnsupportedBitsPerSample(u16),

    #[error("sample rate must be non-zero")]
    InvalidSampleRate,
}

pub type Result<T> = std::result::Result<T, MorseError>;
