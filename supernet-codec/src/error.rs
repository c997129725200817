//! Error types for message encoding, decoding, and framing.

use thiserror::Error;

/// Errors that can occur while encoding, decoding, or framing a [`crate::Message`].
#[derive(Error, Debug)]
pub enum CodecError {
    /// Failed to serialize a message body.
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// A received frame's declared length exceeds the configured maximum.
    #[error("frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge {
        /// Declared or actual frame size.
        size: usize,
        /// Configured maximum frame size.
        max: usize,
    },

    /// The frame's protocol version tag does not match what this node speaks.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The frame's compression tag is not one this build understands.
    #[error("unsupported compression tag: {0}")]
    UnsupportedCompression(u8),

    /// A frame was shorter than the minimum header length.
    #[error("truncated frame: {0} bytes, need at least {1}")]
    TruncatedFrame(usize, usize),

    /// Decompression of a frame body failed.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// A byte slice was not the expected length for an [`crate::Id`] or [`crate::NodeId`].
    #[error("invalid id length: expected {expected}, got {got}")]
    InvalidIdLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        got: usize,
    },
}

/// Convenience result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
