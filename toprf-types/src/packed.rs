//! Fixed-size, explicitly-serialized byte layouts for [`toprf_core::Share`]
//! and [`toprf_core::PartialEval`].
//!
//! The reference protocol describes these as single-byte-aligned C structs.
//! Rust gives no portable guarantee about struct layout, so we never cast
//! memory directly — every encode/decode here writes or reads exact byte
//! offsets by hand, little-endian, with no padding.

use toprf_core::group::{DecodeError, Point, Scalar};
use toprf_core::{PartialEval, Share};

/// Size in bytes of a packed [`Share`]: a 1-byte index plus a 32-byte
/// canonical scalar encoding.
pub const SHARE_BYTES: usize = 33;

/// Size in bytes of a packed [`PartialEval`]: a 1-byte index plus a 32-byte
/// canonical point encoding.
pub const PARTIAL_EVAL_BYTES: usize = 33;

/// Errors decoding a packed share or partial evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PackedDecodeError {
    /// The byte slice was not exactly the expected length.
    #[error("expected {expected} bytes, got {got}")]
    BadLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        got: usize,
    },
    /// The trailing bytes did not decode to a valid scalar.
    #[error("bytes do not encode a canonical scalar")]
    InvalidScalar,
    /// The trailing bytes did not decode to a valid group element.
    #[error(transparent)]
    InvalidPoint(#[from] DecodeError),
}

/// Pack a [`Share`] as `index(1) || value(32)`.
pub fn pack_share(share: &Share) -> [u8; SHARE_BYTES] {
    let mut out = [0u8; SHARE_BYTES];
    out[0] = share.index;
    out[1..].copy_from_slice(&share.value.to_bytes());
    out
}

/// Unpack a [`Share`] from its packed byte encoding.
pub fn unpack_share(bytes: &[u8]) -> Result<Share, PackedDecodeError> {
    if bytes.len() != SHARE_BYTES {
        return Err(PackedDecodeError::BadLength {
            expected: SHARE_BYTES,
            got: bytes.len(),
        });
    }
    let index = bytes[0];
    let mut value_bytes = [0u8; 32];
    value_bytes.copy_from_slice(&bytes[1..]);
    let value =
        Scalar::from_canonical_bytes(value_bytes).ok_or(PackedDecodeError::InvalidScalar)?;
    Ok(Share { index, value })
}

/// Pack a [`PartialEval`] as `index(1) || value(32)`.
pub fn pack_partial_eval(partial: &PartialEval) -> [u8; PARTIAL_EVAL_BYTES] {
    let mut out = [0u8; PARTIAL_EVAL_BYTES];
    out[0] = partial.index;
    out[1..].copy_from_slice(&partial.value.to_bytes());
    out
}

/// Unpack a [`PartialEval`] from its packed byte encoding.
pub fn unpack_partial_eval(bytes: &[u8]) -> Result<PartialEval, PackedDecodeError> {
    if bytes.len() != PARTIAL_EVAL_BYTES {
        return Err(PackedDecodeError::BadLength {
            expected: PARTIAL_EVAL_BYTES,
            got: bytes.len(),
        });
    }
    let index = bytes[0];
    let value = Point::from_bytes(&bytes[1..])?;
    Ok(PartialEval { index, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_roundtrip() {
        let mut rng = rand::thread_rng();
        let share = Share {
            index: 7,
            value: Scalar::random(&mut rng),
        };
        let packed = pack_share(&share);
        assert_eq!(packed.len(), SHARE_BYTES);
        let unpacked = unpack_share(&packed).unwrap();
        assert_eq!(unpacked.index, share.index);
        assert_eq!(unpacked.value.to_bytes(), share.value.to_bytes());
    }

    #[test]
    fn partial_eval_roundtrip() {
        let mut rng = rand::thread_rng();
        let value = Point::mul_base(&Scalar::random(&mut rng));
        let partial = PartialEval { index: 3, value };
        let packed = pack_partial_eval(&partial);
        let unpacked = unpack_partial_eval(&packed).unwrap();
        assert_eq!(unpacked, partial);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(unpack_share(&[0u8; 10]).is_err());
        assert!(unpack_partial_eval(&[0u8; 40]).is_err());
    }
}
