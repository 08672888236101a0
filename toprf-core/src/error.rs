//! Errors returned by [`crate::shamir`], [`crate::oprf`] and [`crate::toprf`].

pub use crate::group::DecodeError;

/// Errors raised by the core threshold-OPRF primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// `create_shares` was called with `t < 2`, `n < t`, or `n > 255`.
    #[error("invalid (n={n}, t={t}) for Shamir sharing")]
    InvalidShareParams {
        /// The requested number of shares.
        n: u16,
        /// The requested threshold.
        t: u16,
    },
    /// A Lagrange coefficient was requested for an index not present in the
    /// contributing set, or the contributing set contained a duplicate.
    #[error("index {index} is not a member of a valid, duplicate-free contributing set")]
    InvalidContributingSet {
        /// The index that was missing or duplicated.
        index: u8,
    },
    /// A blinded point or partial evaluation did not decode to a valid
    /// Ristretto255 group element.
    #[error(transparent)]
    InvalidPoint(#[from] DecodeError),
    /// `threshold_combine`/`threshold_mult` were called with an empty list
    /// of partial evaluations.
    #[error("no partial evaluations supplied")]
    EmptyPartialEvaluations,
}
