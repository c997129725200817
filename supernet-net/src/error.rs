//! Error types for the peer-transport layer.

use thiserror::Error;

/// Errors surfaced while dialing, accepting, handshaking with, or framing
/// traffic for a peer.
#[derive(Error, Debug)]
pub enum NetError {
    /// Underlying TCP/IO failure; disconnects the one affected peer only.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer's `Version.network_id` did not match ours.
    #[error("network id mismatch: expected {expected}, got {got}")]
    NetworkIdMismatch {
        /// Our network id.
        expected: u32,
        /// The peer's claimed network id.
        got: u32,
    },

    /// The peer's protocol version is not compatible with ours.
    #[error("incompatible protocol version: {0:?}")]
    IncompatibleVersion((u16, u16, u16)),

    /// The peer's claimed timestamp is outside the allowed clock-skew window.
    #[error("clock skew too large: peer claimed {claimed}ms, local is {local}ms, max diff {max_diff_ms}ms")]
    ClockSkew {
        /// The peer's claimed timestamp, ms since epoch.
        claimed: u64,
        /// Our local timestamp, ms since epoch.
        local: u64,
        /// The configured maximum allowed difference.
        max_diff_ms: u64,
    },

    /// A signature over the claimed IP+timestamp failed to verify.
    #[error("signature verification failed for {0}")]
    BadSignature(&'static str),

    /// The handshake did not complete within the configured timeout.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// A frame exceeded the configured maximum size.
    #[error("frame exceeded maximum size")]
    FrameTooLarge,

    /// Underlying codec error, re-wrapped so callers have one error type.
    #[error("codec error: {0}")]
    Codec(#[from] supernet_codec::CodecError),

    /// The outbound send queue has been closed.
    #[error("send queue closed")]
    QueueClosed,

    /// `Push` was cancelled before the queue had capacity.
    #[error("push cancelled")]
    PushCancelled,

    /// An inbound message was rejected by an admission throttle.
    #[error("admission throttle rejected message: {0}")]
    Throttled(&'static str),
}

/// Convenience result type for peer-transport operations.
pub type Result<T> = std::result::Result<T, NetError>;
