//! Error taxonomy for the trusted-party DKG protocol.
//!
//! Every variant carries the numeric code used by the reference protocol
//! description (`tp-dkg.h`) via [`RecvError::code`]/[`StepError::code`], so
//! operator-facing logs and [`toprf_types::Cheater`] records stay
//! numerically comparable to that description even though callers here
//! match on the enum, not the integer.

use toprf_types::PartyIndex;

/// Failure of the six-fold envelope receive check (`toprf_dkg::envelope`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RecvError {
    /// The buffer was shorter than the fixed header, or `len` did not match
    /// the buffer it was sliced from.
    #[error("malformed length")]
    BadLength,
    /// `msgno` did not match the step the receiver expected.
    #[error("unexpected msgno {got}, expected {expected}")]
    UnexpectedMsgno {
        /// The `msgno` actually present.
        got: u8,
        /// The `msgno` the receiver was waiting for.
        expected: u8,
    },
    /// `from` did not match who the receiver expected this step's sender
    /// to be.
    #[error("unexpected sender {got:?}")]
    UnexpectedFrom {
        /// The `from` field actually present.
        got: u8,
    },
    /// `to` addressed neither us nor a broadcast.
    #[error("message not addressed to us")]
    UnexpectedTo,
    /// `ts` was not strictly greater than the last accepted timestamp from
    /// this sender, or drifted further than the configured epsilon from the
    /// receiver's local clock.
    #[error("stale or non-monotonic timestamp")]
    StaleTimestamp,
    /// The detached signature did not verify under the expected signing key.
    #[error("signature verification failed")]
    BadSignature,
}

impl RecvError {
    /// The numeric code from the reference protocol description.
    pub fn code(self) -> u16 {
        match self {
            RecvError::BadLength => 1,
            RecvError::UnexpectedMsgno { .. } => 2,
            RecvError::UnexpectedFrom { .. } => 3,
            RecvError::UnexpectedTo => 4,
            RecvError::StaleTimestamp => 5,
            RecvError::BadSignature => 6,
        }
    }
}

/// Failures of a single TP or peer protocol step, beyond a plain receive
/// check failure (which is folded in as [`StepError::Recv`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// A received message failed the envelope receive check.
    #[error(transparent)]
    Recv(#[from] RecvError),
    /// A peer's Feldman commitment did not verify against its delivered
    /// share.
    #[error("peer {peer} sent a share inconsistent with its commitments")]
    BadShare {
        /// The peer whose share failed verification.
        peer: PartyIndex,
    },
    /// A peer accused another peer who turned out to be innocent once the
    /// accuser revealed its session key (a false accusation).
    #[error("peer {accuser} falsely accused peer {accused}")]
    FalseAccusation {
        /// The peer who filed the complaint.
        accuser: PartyIndex,
        /// The peer who was wrongly accused.
        accused: PartyIndex,
    },
    /// A peer revealed a session key for a pair the TP did not ask it to
    /// reveal (no matching complaint).
    #[error("peer {peer} revealed an unrequested session key")]
    UnrequestedReveal {
        /// The peer that over-revealed.
        peer: PartyIndex,
    },
    /// The revealed session key's HMAC-SHA-256 tag did not authenticate the
    /// accused peer's relayed share ciphertext.
    #[error("revealed key's tag did not authenticate peer {peer}'s relayed share")]
    RevealedShareBadTag {
        /// The accused peer whose relayed share failed tag verification.
        peer: PartyIndex,
    },
    /// AEAD decryption of the accused peer's relayed share under the
    /// revealed session key failed.
    #[error("revealed key failed to decrypt peer {peer}'s relayed share")]
    RevealedShareBadCiphertext {
        /// The accused peer whose relayed share failed to decrypt.
        peer: PartyIndex,
    },
    /// The decrypted share was not a canonical scalar, or did not satisfy
    /// Feldman verification against the dealer's published commitments.
    #[error("peer {peer}'s relayed share had an invalid index")]
    InvalidShareIndex {
        /// The accused peer whose relayed share failed verification.
        peer: PartyIndex,
    },
    /// An accused peer never revealed the session key a complaint named,
    /// even after the reveal deadline elapsed.
    #[error("peer {peer} never revealed a session key a complaint named")]
    MissingReveal {
        /// The accused peer that never revealed.
        peer: PartyIndex,
    },
    /// The Noise-XK handshake for a peer pair failed to complete.
    #[error("noise handshake between {a} and {b} failed")]
    HandshakeFailed {
        /// One endpoint of the failed handshake.
        a: PartyIndex,
        /// The other endpoint.
        b: PartyIndex,
    },
    /// A peer's signed transcript digest diverged from the majority's.
    #[error("peer {peer} reported a diverging transcript")]
    TranscriptMismatch {
        /// The peer whose transcript digest diverged.
        peer: PartyIndex,
    },
    /// Too many peers were removed as cheaters for the remaining honest set
    /// to still reach the threshold.
    #[error("only {remaining} honest peers remain, below threshold {threshold}")]
    ThresholdLost {
        /// Honest peers still standing.
        remaining: u8,
        /// The threshold required.
        threshold: u8,
    },
    /// A step function was driven out of order (e.g. `next` called before
    /// all expected inputs for the current step were supplied).
    #[error("step driven out of order")]
    OutOfOrder,
}

impl StepError {
    /// The numeric code from the reference protocol description
    /// (`tp-dkg.h`'s resolution ladder): 3/4/5/6/7 for the complaint ladder,
    /// `16+e`/`32+e` for handshake/transcript failures tagged with the
    /// underlying peer index `e`, and 127/128/129 for terminal conditions.
    pub fn code(&self) -> u16 {
        match self {
            StepError::Recv(e) => e.code() as u16,
            StepError::BadShare { .. } => 129,
            StepError::FalseAccusation { .. } => 128,
            StepError::UnrequestedReveal { .. } => 6,
            StepError::RevealedShareBadTag { .. } => 3,
            StepError::RevealedShareBadCiphertext { .. } => 4,
            StepError::InvalidShareIndex { .. } => 5,
            StepError::MissingReveal { .. } => 7,
            StepError::HandshakeFailed { b, .. } => 16 + b.0 as u16,
            StepError::TranscriptMismatch { peer } => 32 + peer.0 as u16,
            StepError::ThresholdLost { .. } => 127,
            StepError::OutOfOrder => 7,
        }
    }
}

/// Errors raised constructing or driving [`crate::tp::TpState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TpError {
    /// `n`/`t` failed the same validation as `toprf_core::shamir::create_shares`.
    #[error("invalid (n={n}, t={t})")]
    InvalidParams {
        /// Requested party count.
        n: u16,
        /// Requested threshold.
        t: u16,
    },
    /// A protocol step failed.
    #[error(transparent)]
    Step(#[from] StepError),
    /// A lower-layer core error (Lagrange coefficient computation, point
    /// decoding) surfaced while resolving a complaint.
    #[error(transparent)]
    Core(#[from] toprf_core::Error),
}

/// Errors raised constructing or driving [`crate::peer::PeerState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PeerError {
    /// A protocol step failed.
    #[error(transparent)]
    Step(#[from] StepError),
    /// The Noise-XK library reported a handshake or transport error.
    #[error("noise error")]
    Noise,
    /// A lower-layer core error surfaced while verifying a commitment.
    #[error(transparent)]
    Core(#[from] toprf_core::Error),
}

impl From<snow::Error> for PeerError {
    fn from(_: snow::Error) -> Self {
        PeerError::Noise
    }
}
