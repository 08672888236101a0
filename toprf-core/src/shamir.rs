//! Shamir secret sharing and Lagrange interpolation over the Ristretto255
//! scalar field.
//!
//! Polynomial evaluation is Horner's method, which touches only public
//! exponents (`x = 1..=n`) and secret coefficients through the constant-time
//! `Scalar` arithmetic of [`crate::group`] — there is no branch on a secret
//! value anywhere in this module.

use crate::error::Error;
use crate::group::Scalar;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

/// A single party's share of a Shamir-shared secret: `(index, f(index))`.
#[derive(Clone, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct Share {
    /// The evaluation point `x`, in `[1, n]`.
    pub index: u8,
    /// `f(index)`.
    pub value: Scalar,
}

/// Evaluate a polynomial (given lowest-degree-coefficient first) at `x`
/// using Horner's method.
pub fn evaluate_poly(coeffs: &[Scalar], x: Scalar) -> Scalar {
    let mut acc = Scalar::zero();
    for coeff in coeffs.iter().rev() {
        acc = acc * x + *coeff;
    }
    acc
}

/// Split `secret` into `n` Shamir shares such that any `t` of them
/// reconstruct `secret` via Lagrange interpolation at `x = 0`.
///
/// Samples a degree-`(t-1)` polynomial `f` with `f(0) = secret` and
/// `t-1` uniformly random higher coefficients, then returns `(i, f(i))`
/// for `i = 1..=n`.
pub fn create_shares<R: RngCore + CryptoRng>(
    secret: Scalar,
    n: u8,
    t: u8,
    rng: &mut R,
) -> Result<Vec<Share>, Error> {
    if t < 2 || n < t {
        return Err(Error::InvalidShareParams {
            n: n as u16,
            t: t as u16,
        });
    }
    let mut coeffs = Vec::with_capacity(t as usize);
    coeffs.push(secret);
    for _ in 1..t {
        coeffs.push(Scalar::random(rng));
    }
    let shares = (1..=n)
        .map(|i| Share {
            index: i,
            value: evaluate_poly(&coeffs, Scalar::from_u64(i as u64)),
        })
        .collect();
    Ok(shares)
}

fn check_contributing_set(index: u8, peers: &[u8]) -> Result<(), Error> {
    if !peers.contains(&index) {
        return Err(Error::InvalidContributingSet { index });
    }
    let mut sorted = peers.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.len() != peers.len() {
        return Err(Error::InvalidContributingSet { index });
    }
    Ok(())
}

/// The Lagrange coefficient `λ_i = ∏_{j∈peers, j≠i} j · (j−i)^{-1}` for
/// interpolating at `x = 0`, over the contributing index set `peers`
/// (which must include `index` and contain no duplicates).
pub fn coeff(index: u8, peers: &[u8]) -> Result<Scalar, Error> {
    check_contributing_set(index, peers)?;
    let i = Scalar::from_u64(index as u64);
    let mut dividend = Scalar::one();
    let mut divisor = Scalar::one();
    for &j in peers {
        if j == index {
            continue;
        }
        let j_scalar = Scalar::from_u64(j as u64);
        dividend = dividend * j_scalar;
        divisor = divisor * (j_scalar - i);
    }
    Ok(dividend * divisor.invert())
}

/// Compute the Lagrange coefficient for every index in `peers`, in the same
/// order, avoiding recomputing the shared inversions.
pub fn coeffs(peers: &[u8]) -> Result<Vec<Scalar>, Error> {
    peers.iter().map(|&i| coeff(i, peers)).collect()
}

/// Reconstruct the secret `f(0) = Σ_{i∈P} λ_i · f(i)` in the scalar domain.
///
/// This is **not** used by the live TOPRF protocols (which combine in the
/// group exponent, see [`crate::toprf`]) — it exists for tests and as an
/// oracle a caller can use to sanity-check a sharing out-of-band.
pub fn combine_scalars(shares: &[Share]) -> Result<Scalar, Error> {
    let indices: Vec<u8> = shares.iter().map(|s| s.index).collect();
    let lambdas = coeffs(&indices)?;
    Ok(shares
        .iter()
        .zip(lambdas)
        .fold(Scalar::zero(), |acc, (s, l)| acc + l * s.value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(42)
    }

    #[test]
    fn reconstruction_matches_secret() {
        let mut rng = rng();
        let secret = Scalar::random(&mut rng);
        let shares = create_shares(secret, 5, 3, &mut rng).unwrap();
        let subset = vec![shares[0].clone(), shares[2].clone(), shares[4].clone()];
        let reconstructed = combine_scalars(&subset).unwrap();
        assert_eq!(reconstructed.to_bytes(), secret.to_bytes());
    }

    #[test]
    fn lagrange_symmetry() {
        let peers = [1u8, 3, 5];
        let mut shuffled = [5u8, 1, 3];
        assert_eq!(coeff(1, &peers).unwrap().to_bytes(), {
            shuffled.sort_unstable();
            coeff(1, &shuffled).unwrap().to_bytes()
        });
    }

    #[test]
    fn rejects_bad_params() {
        let mut rng = rng();
        let secret = Scalar::random(&mut rng);
        assert!(create_shares(secret, 3, 1, &mut rng).is_err());
        assert!(create_shares(secret, 2, 3, &mut rng).is_err());
    }

    #[test]
    fn rejects_duplicate_or_missing_index() {
        assert!(coeff(2, &[1, 2, 2]).is_err());
        assert!(coeff(4, &[1, 2, 3]).is_err());
    }
}
