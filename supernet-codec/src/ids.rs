//! Fixed-size content and node identifiers.

use {
    crate::error::CodecError,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// A 32-byte content-addressed identifier for a block, vertex, or other
/// consensus item.
///
/// Ordered lexicographically over its bytes; this ordering is used only for
/// deterministic tie-breaks (e.g. in consensus sampling), never as a
/// semantic ranking of items.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Id(pub [u8; 32]);

/// A 20-byte node identifier, derived from a node's TLS certificate.
///
/// Ordered lexicographically over its bytes; validator sets use this
/// ordering to produce a canonical, deterministic iteration order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub [u8; 20]);

macro_rules! impl_fixed_id {
    ($ty:ident, $len:expr) => {
        impl $ty {
            /// Length of this identifier in bytes.
            pub const LEN: usize = $len;

            /// An all-zero identifier, used as a sentinel in tests and defaults.
            pub const fn zero() -> Self {
                Self([0u8; $len])
            }

            /// Borrow the raw bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Build an identifier from a byte slice of the exact expected length.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
                if bytes.len() != $len {
                    return Err(CodecError::InvalidIdLength {
                        expected: $len,
                        got: bytes.len(),
                    });
                }
                let mut buf = [0u8; $len];
                buf.copy_from_slice(bytes);
                Ok(Self(buf))
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($ty), self)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }

        impl From<[u8; $len]> for $ty {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $ty {
            type Error = CodecError;

            fn try_from(bytes: &[u8]) -> Result<Self, CodecError> {
                Self::from_slice(bytes)
            }
        }
    };
}

impl_fixed_id!(Id, 32);
impl_fixed_id!(NodeId, 20);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexicographic_ordering() {
        let a = Id::from_slice(&[0u8; 32]).unwrap();
        let mut high = [0u8; 32];
        high[31] = 1;
        let b = Id::from(high);
        assert!(a < b);
    }

    #[test]
    fn test_node_id_rejects_wrong_length() {
        let err = NodeId::from_slice(&[0u8; 19]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidIdLength {
                expected: 20,
                got: 19
            }
        ));
    }

    #[test]
    fn test_display_is_lowercase_hex() {
        let id = NodeId::from([0xABu8; 20]);
        assert_eq!(id.to_string(), "ab".repeat(20));
    }

    #[test]
    fn test_zero_is_all_zero_bytes() {
        assert_eq!(Id::zero().as_bytes(), &[0u8; 32]);
    }
}
