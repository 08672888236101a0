#![deny(missing_docs)]
//! Wire types shared between the TP and peer sides of the trusted-party DKG
//! protocol, and between OPRF shareholders and clients.
//!
//! This crate groups together the strongly-typed identifiers and framed
//! message structures used across the protocol:
//!
//! * [`SessionId`], [`PartyIndex`] — small, `Copy` identifiers with
//!   consistent serialization and display.
//! * Packed byte encodings for [`toprf_core::Share`] and
//!   [`toprf_core::PartialEval`] (see [`packed`]).
//! * The message envelope used by every TP-DKG protocol message (see
//!   [`wire`]).
//! * [`Cheater`], the structured record of a detected protocol violation.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod packed;
pub mod wire;

/// A random 32-byte tag pinning every message of one protocol run to the
/// same session, chosen by the TP in `msg0`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub [u8; 32]);

impl SessionId {
    /// Sample a fresh random session id.
    pub fn random<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", hex_string(&self.0))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex_string(&self.0))
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// The 1-indexed position of a peer among the `n` DKG participants, in
/// `[1, n]`. The TP itself is addressed separately (see
/// [`wire::Destination::Tp`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartyIndex(pub u8);

impl fmt::Display for PartyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

impl From<u8> for PartyIndex {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<PartyIndex> for u8 {
    fn from(value: PartyIndex) -> Self {
        value.0
    }
}

/// A structured record of one detected protocol violation, surfaced to the
/// caller when the TP-DKG run aborts.
///
/// Mirrors `TP_DKG_Cheater` from the reference protocol description: the
/// step the violation was detected in, the numeric error code (see
/// `toprf_dkg::error`), the accused peer, the peer that reported it (when
/// applicable), and the share index involved (when applicable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cheater {
    /// The `msgno`/step the violation was detected at.
    pub step: u8,
    /// The numeric error code, see `toprf_dkg::error`.
    pub error: u16,
    /// The peer blamed for the violation.
    pub peer: PartyIndex,
    /// The peer that reported the violation, if any. `None` for violations
    /// the TP itself detects without a complaint (e.g. an over-reveal).
    pub other_peer: Option<PartyIndex>,
    /// The share index involved, if applicable.
    pub invalid_index: Option<u8>,
}

impl Cheater {
    /// Render this record as a single human-readable line, suitable for
    /// operator-facing logs (the `cheater_msg` equivalent).
    pub fn render(&self) -> String {
        match self.other_peer {
            Some(other) => format!(
                "step {}: peer {} violated the protocol (error {}), reported by {}",
                self.step, self.peer, self.error, other
            ),
            None => format!(
                "step {}: peer {} violated the protocol (error {})",
                self.step, self.peer, self.error
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cheater_render_includes_reporter() {
        let c = Cheater {
            step: 18,
            error: 129,
            peer: PartyIndex(2),
            other_peer: Some(PartyIndex(3)),
            invalid_index: None,
        };
        let msg = c.render();
        assert!(msg.contains("peer#2"));
        assert!(msg.contains("peer#3"));
        assert!(msg.contains("129"));
    }
}
