//! Wire types and framing for the supernet network protocol.
//!
//! Every byte sequence exchanged between nodes is a length-prefixed,
//! versioned, type-tagged frame carrying a bincode-encoded [`Message`].
//! This crate owns that framing contract plus the [`Id`]/[`NodeId`]
//! identifiers used throughout the rest of the workspace.

mod error;
mod framing;
mod ids;
mod message;

pub use error::{CodecError, Result};
pub use framing::{decode_frame, encode_frame, read_frame_len, Compression, FRAME_HEADER_LEN, PROTOCOL_VERSION};
pub use ids::{Id, NodeId};
pub use message::{AppError, BootstrapFailure, Message, MessageKind, SignedPeerIp};
