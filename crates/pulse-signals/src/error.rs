//! Error types for the signal core.

use thiserror::Error;

/// Errors raised by buffers, transforms and source separation.
///
/// `InsufficientData` is usually recovered by the caller: the heart-rate
/// extractor turns it into [`HeartRate::Unknown`](crate::HeartRate) and the
/// pipeline falls back to a raw channel when separation cannot run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    #[error("real/imaginary length mismatch: real={real}, imag={imag}")]
    ShapeMismatch { real: usize, imag: usize },

    #[error("transform length {0} is not a power of two")]
    InvalidLength(usize),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("channel {channel} has {len} samples but the shortest channel has {expected}")]
    ChannelLengthMismatch {
        channel: &'static str,
        len: usize,
        expected: usize,
    },

    #[error("buffer is full (capacity {capacity}); shift before pushing")]
    BufferFull { capacity: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

pub type Result<T> = std::result::Result<T, SignalError>;
