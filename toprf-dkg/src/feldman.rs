//! Feldman verifiable secret sharing: committing to a dealt polynomial's
//! coefficients so recipients can check a delivered share without trusting
//! the dealer.

use toprf_core::group::{Point, Scalar};

/// Commit to a polynomial's coefficients (lowest degree first): `C_m =
/// g^{a_m}`.
pub fn commit(coeffs: &[Scalar]) -> Vec<Point> {
    coeffs.iter().map(Point::mul_base).collect()
}

/// Check that `share = f(x)` is consistent with `commitments` by evaluating
/// `Σ_m C_m^{x^m}` via Horner's method in the exponent and comparing against
/// `g^share`.
pub fn verify(commitments: &[Point], x: u8, share: &Scalar) -> bool {
    let x = Scalar::from_u64(x as u64);
    let mut acc = Point::identity();
    for c in commitments.iter().rev() {
        acc = acc.mul(&x).add(c);
    }
    acc.ct_eq(&Point::mul_base(share))
}

#[cfg(test)]
mod tests {
    use super::*;
    use toprf_core::shamir::evaluate_poly;

    #[test]
    fn accepts_consistent_share() {
        let mut rng = rand::thread_rng();
        let coeffs: Vec<Scalar> = (0..3).map(|_| Scalar::random(&mut rng)).collect();
        let commitments = commit(&coeffs);
        let share = evaluate_poly(&coeffs, Scalar::from_u64(4));
        assert!(verify(&commitments, 4, &share));
    }

    #[test]
    fn rejects_tampered_share() {
        let mut rng = rand::thread_rng();
        let coeffs: Vec<Scalar> = (0..3).map(|_| Scalar::random(&mut rng)).collect();
        let commitments = commit(&coeffs);
        let mut share = evaluate_poly(&coeffs, Scalar::from_u64(4));
        share = share + Scalar::one();
        assert!(!verify(&commitments, 4, &share));
    }
}
