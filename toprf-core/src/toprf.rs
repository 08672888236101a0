//! Threshold OPRF (TOPRF): per-shareholder evaluation and combination.
//!
//! The PRF key `k` is Shamir-shared across `n` parties (see [`crate::shamir`]).
//! Any `t` of them can jointly realize the single-server OPRF of
//! [`crate::oprf`] on a client's blinded query without reconstructing `k`.
//!
//! Two combination functions exist, matching `liboprf`'s
//! `toprf_thresholdcombine`/`toprf_thresholdmult`, and **must not be mixed
//! for the same subset of responses**:
//!
//! - [`threshold_combine`] sums partials whose Lagrange factor was already
//!   folded in by [`evaluate`] (the common case: each shareholder applies its
//!   own `λ_i` before responding, so the combiner is a plain sum).
//! - [`threshold_mult`] recomputes `λ_i` from the indices present in the
//!   supplied partials and performs the exponentiation-and-sum itself; use it
//!   only when shareholders returned raw `α^{k_i}` without folding in `λ_i`.

use crate::error::Error;
use crate::group::{Point, Scalar};
use crate::shamir::{self, Share};
use serde::{Deserialize, Serialize};

/// One shareholder's contribution to a TOPRF evaluation: `(index, β_i)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialEval {
    /// The shareholder's index.
    pub index: u8,
    /// The (possibly Lagrange-weighted) partial evaluation.
    pub value: Point,
}

/// The Lagrange coefficient for `index` within `peers`. Re-exported here so
/// callers driving the TOPRF protocol don't need to reach into
/// [`crate::shamir`] directly.
pub fn coeff(index: u8, peers: &[u8]) -> Result<Scalar, Error> {
    shamir::coeff(index, peers)
}

/// A single shareholder's TOPRF evaluation.
///
/// Computes `λ_i` over the full contributing set `peers` (which must include
/// `share.index`), folds it into the share (`k_i' = k_i · λ_i`), and
/// exponentiates the client's blinded point: `β_i = α^{k_i'}`.
///
/// The Lagrange factor is folded in here precisely so that the client-side
/// combiner ([`threshold_combine`]) is a plain group sum.
pub fn evaluate(share: &Share, blinded: &Point, peers: &[u8]) -> Result<PartialEval, Error> {
    let lambda = coeff(share.index, peers)?;
    let weighted_key = share.value * lambda;
    Ok(PartialEval {
        index: share.index,
        value: blinded.mul(&weighted_key),
    })
}

/// Combine partial evaluations whose Lagrange factor is already folded in
/// (as produced by [`evaluate`]): `β = Σ_i β_i = α^k`.
pub fn threshold_combine(partials: &[PartialEval]) -> Result<Point, Error> {
    if partials.is_empty() {
        return Err(Error::EmptyPartialEvaluations);
    }
    Ok(partials
        .iter()
        .fold(Point::identity(), |acc, p| acc.add(&p.value)))
}

/// Combine raw, Lagrange-unweighted partial evaluations `β_i = α^{k_i}`:
/// recomputes `λ_i` from the indices present in `partials` and computes
/// `β = Σ_i β_i^{λ_i} = α^k`.
pub fn threshold_mult(partials: &[PartialEval]) -> Result<Point, Error> {
    if partials.is_empty() {
        return Err(Error::EmptyPartialEvaluations);
    }
    let indices: Vec<u8> = partials.iter().map(|p| p.index).collect();
    let lambdas = shamir::coeffs(&indices)?;
    Ok(partials
        .iter()
        .zip(lambdas)
        .fold(Point::identity(), |acc, (p, l)| {
            acc.add(&p.value.mul(&l))
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oprf;

    #[test]
    fn toprf_matches_single_server_oprf() {
        let mut rng = rand::thread_rng();
        let key = Scalar::random(&mut rng);
        let shares = shamir::create_shares(key, 5, 3, &mut rng).unwrap();
        let used = [shares[0].clone(), shares[1].clone(), shares[4].clone()];
        let peers: Vec<u8> = used.iter().map(|s| s.index).collect();

        let x = b"hello";
        let r = oprf::sample_blind(&mut rng);
        let alpha = oprf::blind(x, r);

        let partials: Vec<PartialEval> = used
            .iter()
            .map(|s| evaluate(s, &alpha, &peers).unwrap())
            .collect();
        let beta = threshold_combine(&partials).unwrap();
        let toprf_out = oprf::unblind(x, &beta, r);

        let expected_beta = oprf::evaluate_point(key, &alpha);
        let expected_out = oprf::unblind(x, &expected_beta, r);
        assert_eq!(toprf_out, expected_out);
    }

    #[test]
    fn threshold_mult_matches_combine_when_unweighted() {
        let mut rng = rand::thread_rng();
        let key = Scalar::random(&mut rng);
        let shares = shamir::create_shares(key, 4, 2, &mut rng).unwrap();
        let used = [shares[1].clone(), shares[3].clone()];
        let peers: Vec<u8> = used.iter().map(|s| s.index).collect();

        let alpha = Point::hash_to_curve(b"test", b"query");
        let raw_partials: Vec<PartialEval> = used
            .iter()
            .map(|s| PartialEval {
                index: s.index,
                value: alpha.mul(&s.value),
            })
            .collect();
        let weighted_partials: Vec<PartialEval> = used
            .iter()
            .map(|s| evaluate(s, &alpha, &peers).unwrap())
            .collect();

        let via_mult = threshold_mult(&raw_partials).unwrap();
        let via_combine = threshold_combine(&weighted_partials).unwrap();
        assert_eq!(via_mult, via_combine);
        assert_eq!(via_mult, alpha.mul(&key));
    }

    #[test]
    fn empty_partials_rejected() {
        assert!(threshold_combine(&[]).is_err());
        assert!(threshold_mult(&[]).is_err());
    }
}
