//! Length-prefixed frame layout for messages on the wire.
//!
//! ```text
//! [4 bytes: body length, u32-be] [1 byte: protocol version] [1 byte: compression tag] [N bytes: body]
//! ```
//!
//! The length prefix covers everything after itself (version tag,
//! compression tag, and body). Compression, when enabled, applies to the
//! bincode-encoded body only and is chosen per message type by the caller.

use crate::error::{CodecError, Result};

/// Protocol version this build speaks. Frames carrying any other version are
/// rejected rather than interpreted speculatively.
pub const PROTOCOL_VERSION: u8 = 1;

/// Bytes consumed by the length prefix, version tag, and compression tag
/// before the body begins.
pub const FRAME_HEADER_LEN: usize = 4 + 1 + 1;

/// Per-message-type body compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Body is raw bincode bytes.
    None,
    /// Body is gzip-compressed bincode bytes.
    Gzip,
    /// Body is zstd-compressed bincode bytes.
    Zstd,
}

impl Compression {
    fn tag(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Gzip => 1,
            Compression::Zstd => 2,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Gzip),
            2 => Ok(Compression::Zstd),
            other => Err(CodecError::UnsupportedCompression(other)),
        }
    }

    fn compress(self, body: &[u8]) -> Result<Vec<u8>> {
        use std::io::Write;
        match self {
            Compression::None => Ok(body.to_vec()),
            Compression::Gzip => {
                let mut encoder =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder
                    .write_all(body)
                    .map_err(|e| CodecError::Decompression(e.to_string()))?;
                encoder
                    .finish()
                    .map_err(|e| CodecError::Decompression(e.to_string()))
            }
            Compression::Zstd => zstd::stream::encode_all(body, 0)
                .map_err(|e| CodecError::Decompression(e.to_string())),
        }
    }

    fn decompress(self, body: &[u8]) -> Result<Vec<u8>> {
        use std::io::Read;
        match self {
            Compression::None => Ok(body.to_vec()),
            Compression::Gzip => {
                let mut decoder = flate2::read::GzDecoder::new(body);
                let mut out = Vec::new();
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| CodecError::Decompression(e.to_string()))?;
                Ok(out)
            }
            Compression::Zstd => zstd::stream::decode_all(body)
                .map_err(|e| CodecError::Decompression(e.to_string())),
        }
    }
}

/// Read the body length out of a 4-byte big-endian header.
pub fn read_frame_len(header: &[u8; 4]) -> usize {
    u32::from_be_bytes(*header) as usize
}

/// Encode a raw (already-serialized) body into a complete frame, applying
/// `compression` and enforcing `max_size` against the post-compression body.
pub fn encode_frame(body: &[u8], compression: Compression, max_size: usize) -> Result<Vec<u8>> {
    let compressed = compression.compress(body)?;
    if compressed.len() > max_size {
        return Err(CodecError::FrameTooLarge {
            size: compressed.len(),
            max: max_size,
        });
    }
    let len = u32::try_from(compressed.len()).map_err(|_| CodecError::FrameTooLarge {
        size: compressed.len(),
        max: u32::MAX as usize,
    })?;
    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN.saturating_add(compressed.len()));
    buf.extend_from_slice(&len.to_be_bytes());
    buf.push(PROTOCOL_VERSION);
    buf.push(compression.tag());
    buf.extend_from_slice(&compressed);
    Ok(buf)
}

/// Decode a complete frame (header + body) back into a raw serialized body.
pub fn decode_frame(frame: &[u8], max_size: usize) -> Result<Vec<u8>> {
    if frame.len() < FRAME_HEADER_LEN {
        return Err(CodecError::TruncatedFrame(frame.len(), FRAME_HEADER_LEN));
    }
    let len = read_frame_len(frame[0..4].try_into().expect("slice is exactly 4 bytes"));
    let version = frame[4];
    if version != PROTOCOL_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let compression = Compression::from_tag(frame[5])?;
    if len > max_size {
        return Err(CodecError::FrameTooLarge { size: len, max: max_size });
    }
    let body_end = FRAME_HEADER_LEN.saturating_add(len);
    if frame.len() < body_end {
        return Err(CodecError::TruncatedFrame(frame.len(), body_end));
    }
    compression.decompress(&frame[FRAME_HEADER_LEN..body_end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_uncompressed() {
        let body = b"hello supernet".to_vec();
        let frame = encode_frame(&body, Compression::None, 1024).unwrap();
        let decoded = decode_frame(&frame, 1024).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_roundtrip_gzip() {
        let body = vec![7u8; 4096];
        let frame = encode_frame(&body, Compression::Gzip, 8192).unwrap();
        let decoded = decode_frame(&frame, 8192).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_roundtrip_zstd() {
        let body = vec![9u8; 4096];
        let frame = encode_frame(&body, Compression::Zstd, 8192).unwrap();
        let decoded = decode_frame(&frame, 8192).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_rejects_oversized_body() {
        let body = vec![0u8; 100];
        let err = encode_frame(&body, Compression::None, 10).unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge { .. }));
    }

    #[test]
    fn test_rejects_unsupported_version() {
        let mut frame = encode_frame(b"x", Compression::None, 64).unwrap();
        frame[4] = 99;
        let err = decode_frame(&frame, 64).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedVersion(99)));
    }

    #[test]
    fn test_rejects_truncated_frame() {
        let err = decode_frame(&[0, 0, 0, 5, 1], 64).unwrap_err();
        assert!(matches!(err, CodecError::TruncatedFrame(_, _)));
    }
}
