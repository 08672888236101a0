//! Thin adapter over the Ristretto255 prime-order group.
//!
//! [`Scalar`] and [`Point`] wrap `curve25519-dalek` types and expose exactly
//! the operations the rest of this crate (and `toprf-dkg`) need: random
//! sampling, field arithmetic (including inversion, for Lagrange
//! coefficients), fixed-base and variable-base scalar multiplication, and
//! canonical encoding/decoding with validation. Everything here is opaque to
//! callers outside the crate on purpose — they should go through
//! [`crate::shamir`], [`crate::oprf`] or [`crate::toprf`] instead.
//!
//! All arithmetic on secret scalars is constant time: `curve25519-dalek`
//! implements scalar and point operations without secret-dependent
//! branching, and we never add our own.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::traits::Identity;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// An element of the Ristretto255 scalar field.
///
/// Canonical 32-byte little-endian encoding. Zeroized on drop since scalars
/// are frequently secret (a share value, a blinding factor, a polynomial
/// coefficient).
#[derive(Clone, Copy, PartialEq, Eq, Zeroize)]
pub struct Scalar(curve25519_dalek::scalar::Scalar);

/// An element of the Ristretto255 group.
///
/// Canonical 32-byte encoding via `CompressedRistretto`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Point(RistrettoPoint);

/// Errors raised while decoding group elements from untrusted bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The byte slice was not a canonical, valid Ristretto255 point encoding.
    #[error("bytes do not encode a valid Ristretto255 point")]
    InvalidPoint,
    /// The byte slice did not have the expected length.
    #[error("expected {expected} bytes, got {got}")]
    BadLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        got: usize,
    },
}

impl Scalar {
    /// Sample a uniformly random, non-secret-dependent scalar.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(curve25519_dalek::scalar::Scalar::random(rng))
    }

    /// The additive identity.
    pub fn zero() -> Self {
        Self(curve25519_dalek::scalar::Scalar::ZERO)
    }

    /// The multiplicative identity.
    pub fn one() -> Self {
        Self(curve25519_dalek::scalar::Scalar::ONE)
    }

    /// Construct a scalar from a small non-negative integer (used to encode
    /// Shamir evaluation points `x = 1..=n`).
    pub fn from_u64(value: u64) -> Self {
        Self(curve25519_dalek::scalar::Scalar::from(value))
    }

    /// Returns `true` iff this is the zero scalar.
    pub fn is_zero(&self) -> bool {
        self.0 == curve25519_dalek::scalar::Scalar::ZERO
    }

    /// Field inversion. Panics if `self` is zero — callers (Lagrange
    /// coefficient computation) must ensure the divisor is non-zero, which
    /// holds whenever the contributing index set has no duplicate indices.
    pub fn invert(&self) -> Self {
        Self(self.0.invert())
    }

    /// Little-endian canonical byte encoding.
    pub fn to_bytes(self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Decode a canonical little-endian scalar. Returns `None` if the bytes
    /// are not the canonical encoding of a scalar field element.
    pub fn from_canonical_bytes(bytes: [u8; 32]) -> Option<Self> {
        Option::from(curve25519_dalek::scalar::Scalar::from_canonical_bytes(
            bytes,
        ))
        .map(Self)
    }
}

impl std::ops::Add for Scalar {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Scalar {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Scalar {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self(self.0 * rhs.0)
    }
}

impl std::ops::Neg for Scalar {
    type Output = Self;
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl std::fmt::Debug for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Scalar(..)")
    }
}

impl Serialize for Scalar {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: [u8; 32] = <[u8; 32]>::deserialize(deserializer)?;
        Self::from_canonical_bytes(bytes)
            .ok_or_else(|| serde::de::Error::custom("non-canonical scalar encoding"))
    }
}

impl Point {
    /// The group identity element.
    pub fn identity() -> Self {
        Self(RistrettoPoint::identity())
    }

    /// Fixed-base scalar multiplication: `g^scalar`.
    pub fn mul_base(scalar: &Scalar) -> Self {
        Self(curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT * scalar.0)
    }

    /// Variable-base scalar multiplication: `self^scalar`.
    pub fn mul(&self, scalar: &Scalar) -> Self {
        Self(self.0 * scalar.0)
    }

    /// Group addition.
    pub fn add(&self, other: &Self) -> Self {
        Self(self.0 + other.0)
    }

    /// Constant-time equality over the compressed encodings via
    /// `subtle::ConstantTimeEq`, safe to use when either operand may be
    /// secret-dependent (e.g. comparing commitments against a recomputed
    /// value during Feldman verification).
    pub fn ct_eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.0
            .compress()
            .as_bytes()
            .ct_eq(other.0.compress().as_bytes())
            .into()
    }

    /// Canonical 32-byte encoding.
    pub fn to_bytes(self) -> [u8; 32] {
        self.0.compress().to_bytes()
    }

    /// Decode and validate a canonical Ristretto255 point encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| DecodeError::BadLength {
            expected: 32,
            got: bytes.len(),
        })?;
        CompressedRistretto(bytes)
            .decompress()
            .map(Self)
            .ok_or(DecodeError::InvalidPoint)
    }

    /// Map an arbitrary-length byte string onto the curve (hash-to-curve),
    /// used to realize `H'(x)` in the 2HashDH construction. Uses a 64-byte
    /// BLAKE3 extendable digest fed into `RistrettoPoint::from_uniform_bytes`,
    /// which is uniform over the group by construction.
    pub fn hash_to_curve(domain: &[u8], input: &[u8]) -> Self {
        let mut xof = blake3::Hasher::new_derive_key(std::str::from_utf8(domain).unwrap_or("toprf-hash-to-curve"));
        xof.update(input);
        let mut wide = [0u8; 64];
        xof.finalize_xof().fill(&mut wide);
        Self(RistrettoPoint::from_uniform_bytes(&wide))
    }
}

impl Serialize for Point {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for Point {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_roundtrip() {
        let mut rng = rand::thread_rng();
        let s = Scalar::random(&mut rng);
        assert_eq!(Scalar::from_canonical_bytes(s.to_bytes()), Some(s));
    }

    #[test]
    fn point_roundtrip() {
        let mut rng = rand::thread_rng();
        let s = Scalar::random(&mut rng);
        let p = Point::mul_base(&s);
        assert_eq!(Point::from_bytes(&p.to_bytes()).unwrap(), p);
    }

    #[test]
    fn invalid_point_rejected() {
        assert!(Point::from_bytes(&[0xffu8; 32]).is_err());
    }

    #[test]
    fn hash_to_curve_deterministic() {
        let a = Point::hash_to_curve(b"toprf-test", b"hello");
        let b = Point::hash_to_curve(b"toprf-test", b"hello");
        let c = Point::hash_to_curve(b"toprf-test", b"world");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
