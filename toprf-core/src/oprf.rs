//! The non-threshold 2HashDH OPRF this crate's TOPRF generalizes.
//!
//! `fk(x) = H2(x, H1(x)^k)`: the client blinds `H1(x)` with a random factor,
//! the server exponentiates by its key, and the client unblinds and hashes
//! the result together with the original input. See [`crate::toprf`] for the
//! threshold variant, which shares `k` via Shamir and folds the Lagrange
//! factor into each shareholder's exponentiation.

use crate::error::Error;
use crate::group::{Point, Scalar};
use rand::{CryptoRng, RngCore};

/// Domain separator for the `H1` hash-to-curve step.
pub const H1_DOMAIN: &[u8] = b"toprf-oprf-h1";

/// Map the client's query onto the curve: `H1(x)`.
pub fn hash_to_curve(input: &[u8]) -> Point {
    Point::hash_to_curve(H1_DOMAIN, input)
}

/// Sample a random, non-zero blinding factor `r`.
pub fn sample_blind<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
    loop {
        let r = Scalar::random(rng);
        if !r.is_zero() {
            return r;
        }
    }
}

/// Blind a query: `α = H1(x)^r`.
pub fn blind(input: &[u8], r: Scalar) -> Point {
    hash_to_curve(input).mul(&r)
}

/// The server-side OPRF evaluation: `β = α^k`.
///
/// Fails if `alpha_bytes` does not decode to a valid Ristretto255 point.
pub fn evaluate(key: Scalar, alpha_bytes: &[u8]) -> Result<Point, Error> {
    let alpha = Point::from_bytes(alpha_bytes)?;
    Ok(evaluate_point(key, &alpha))
}

/// As [`evaluate`], operating directly on an already-decoded point.
pub fn evaluate_point(key: Scalar, alpha: &Point) -> Point {
    alpha.mul(&key)
}

/// Unblind the server's response and finalize the PRF output:
/// `H2(x, β^{r^{-1}})`.
pub fn unblind(input: &[u8], beta: &Point, r: Scalar) -> [u8; 32] {
    let r_inv = r.invert();
    let unblinded = beta.mul(&r_inv);
    finalize(input, &unblinded)
}

/// `H2(x, point)`, the final hash binding the client's query to the
/// reconstructed `H1(x)^k`.
pub fn finalize(input: &[u8], point: &Point) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key("toprf-oprf-h2");
    hasher.update(input);
    hasher.update(&point.to_bytes());
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oprf_correctness() {
        let mut rng = rand::thread_rng();
        let key = Scalar::random(&mut rng);
        let x = b"hello";
        let r = sample_blind(&mut rng);
        let alpha = blind(x, r);
        let beta = evaluate_point(key, &alpha);
        let out = unblind(x, &beta, r);

        let expected = finalize(x, &hash_to_curve(x).mul(&key));
        assert_eq!(out, expected);
    }

    #[test]
    fn different_blinds_same_output() {
        let mut rng = rand::thread_rng();
        let key = Scalar::random(&mut rng);
        let x = b"hello";
        let r1 = sample_blind(&mut rng);
        let r2 = sample_blind(&mut rng);
        assert_ne!(blind(x, r1), blind(x, r2));

        let out1 = unblind(x, &evaluate_point(key, &blind(x, r1)), r1);
        let out2 = unblind(x, &evaluate_point(key, &blind(x, r2)), r2);
        assert_eq!(out1, out2);
    }

    #[test]
    fn rejects_invalid_point() {
        let key = Scalar::random(&mut rand::thread_rng());
        assert!(evaluate(key, &[0xffu8; 32]).is_err());
    }
}
