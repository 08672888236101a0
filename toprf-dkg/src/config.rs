//! DKG run parameters.
//!
//! A library-only configuration type: this crate has no CLI surface, so
//! this is a plain struct with a validating constructor rather than a
//! `clap::Parser` derive.

use crate::error::TpError;

/// Parameters fixing the shape of one trusted-party DKG run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DkgParams {
    /// Number of participating peers.
    pub n: u8,
    /// Reconstruction threshold; any `t` honest peers can reconstruct.
    pub t: u8,
    /// Maximum allowed clock drift for the envelope freshness check,
    /// seconds.
    pub ts_epsilon: u64,
}

impl DkgParams {
    /// Construct and validate a parameter set. Mirrors the validation of
    /// `toprf_core::shamir::create_shares`: `t >= 2` and `n >= t`.
    pub fn new(n: u8, t: u8, ts_epsilon: u64) -> Result<Self, TpError> {
        if t < 2 || n < t {
            return Err(TpError::InvalidParams {
                n: n as u16,
                t: t as u16,
            });
        }
        Ok(Self { n, t, ts_epsilon })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_params() {
        assert!(DkgParams::new(2, 3, 30).is_err());
        assert!(DkgParams::new(5, 1, 30).is_err());
    }

    #[test]
    fn accepts_valid_params() {
        let params = DkgParams::new(5, 3, 30).unwrap();
        assert_eq!(params.n, 5);
        assert_eq!(params.t, 3);
    }
}
