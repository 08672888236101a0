//! The running transcript hash binding every party to an identical ordered
//! view of the protocol run.
//!
//! Every framed message, inbound or outbound, is folded into a keyed BLAKE3
//! hasher in the order it was sent or received. At the designated step each
//! peer signs its current digest and the TP compares all of them; any
//! divergence means at least one party saw a different message sequence
//! (e.g. the TP relayed inconsistent views), which the protocol surfaces as
//! [`crate::error::StepError::TranscriptMismatch`].

use toprf_types::SessionId;

const PERSONALIZATION: &str = "toprf-dkg-transcript-v1";

/// An append-only, keyed transcript hash for one protocol session.
#[derive(Clone)]
pub struct Transcript {
    hasher: blake3::Hasher,
}

impl Transcript {
    /// Start a fresh transcript for `session_id`, keyed so transcripts from
    /// different sessions (or different protocol versions) never collide.
    pub fn new(session_id: SessionId) -> Self {
        let mut key_material = [0u8; 32];
        let mut derive = blake3::Hasher::new_derive_key(PERSONALIZATION);
        derive.update(&session_id.0);
        derive.finalize_xof().fill(&mut key_material);
        Self {
            hasher: blake3::Hasher::new_keyed(&key_material),
        }
    }

    /// Fold one framed message's bytes into the transcript, in the order it
    /// was sent or received.
    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// The current 32-byte digest. Calling this does not consume the
    /// transcript; more messages can be folded in afterward.
    pub fn digest(&self) -> [u8; 32] {
        *self.hasher.finalize().as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_sensitive() {
        let mut a = Transcript::new(SessionId([1u8; 32]));
        let mut b = Transcript::new(SessionId([1u8; 32]));
        a.update(b"one");
        a.update(b"two");
        b.update(b"two");
        b.update(b"one");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn same_session_same_order_matches() {
        let mut a = Transcript::new(SessionId([2u8; 32]));
        let mut b = Transcript::new(SessionId([2u8; 32]));
        for msg in [b"hello".as_slice(), b"world".as_slice()] {
            a.update(msg);
            b.update(msg);
        }
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn different_session_diverges() {
        let mut a = Transcript::new(SessionId([3u8; 32]));
        let mut b = Transcript::new(SessionId([4u8; 32]));
        a.update(b"same");
        b.update(b"same");
        assert_ne!(a.digest(), b.digest());
    }
}
