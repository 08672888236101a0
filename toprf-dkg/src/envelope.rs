//! Signing, framing and the six-fold receive check for TP-DKG messages.
//!
//! Every message is signed with an Ed25519 key: the long-term key supplied
//! out-of-band for the `msg0` bootstrap round, an ephemeral key (freshly
//! generated and announced in `msg0`/`msg1`) for everything after. This
//! module only deals in already-selected keys; key lifecycle lives in
//! [`crate::tp`] and [`crate::peer`].

use crate::error::RecvError;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use toprf_types::wire::{Destination, Frame, Header, Origin};
use toprf_types::SessionId;

/// Sign `data` and produce a fully framed, ready-to-send message.
pub fn sign_and_frame(
    signing_key: &SigningKey,
    msgno: u8,
    from: Origin,
    to: Destination,
    ts: u64,
    session_id: SessionId,
    data: Vec<u8>,
) -> Frame {
    let mut header = Header {
        sig: [0u8; 64],
        msgno,
        len: 0,
        from,
        to,
        ts,
        session_id,
    };
    header.len = (toprf_types::wire::HEADER_BYTES + data.len()) as u32;
    let payload = header.signing_payload(&data);
    let sig: Signature = signing_key.sign(&payload);
    header.sig = sig.to_bytes();
    Frame { header, data }
}

/// The context a receiver checks an incoming frame against: the step it is
/// waiting for, who it expects the sender to be, the verifying key to check
/// the signature under, the last accepted timestamp from that sender, the
/// receiver's own local clock, and the maximum allowed clock drift.
pub struct ReceiveContext<'a> {
    /// The `msgno` the receiver is waiting for.
    pub expected_msgno: u8,
    /// The sender the receiver expects this step's message to come from.
    pub expected_from: Origin,
    /// Our own party address, used to check `to`.
    pub us: Destination,
    /// The signer's public key.
    pub verifying_key: &'a VerifyingKey,
    /// The last timestamp accepted from this sender, if any.
    pub last_ts: Option<u64>,
    /// Receiver's current local time, seconds since the Unix epoch.
    pub now: u64,
    /// Maximum allowed `|now - ts|` drift, seconds.
    pub ts_epsilon: u64,
}

/// Apply the six-fold receive check (length, msgno, from, to,
/// freshness/monotonicity, signature) to a raw buffer, returning the parsed
/// frame on success.
pub fn receive(bytes: &[u8], ctx: &ReceiveContext<'_>) -> Result<Frame, RecvError> {
    let frame = Frame::from_bytes(bytes).ok_or(RecvError::BadLength)?;
    if frame.header.msgno != ctx.expected_msgno {
        return Err(RecvError::UnexpectedMsgno {
            got: frame.header.msgno,
            expected: ctx.expected_msgno,
        });
    }
    if frame.header.from != ctx.expected_from {
        return Err(RecvError::UnexpectedFrom {
            got: frame.header.from.to_byte(),
        });
    }
    let addressed_to_us = frame.header.to == ctx.us || frame.header.to == Destination::Broadcast;
    if !addressed_to_us {
        return Err(RecvError::UnexpectedTo);
    }
    let monotonic = ctx.last_ts.is_none_or(|last| frame.header.ts > last);
    let fresh = frame.header.ts.abs_diff(ctx.now) <= ctx.ts_epsilon;
    if !monotonic || !fresh {
        return Err(RecvError::StaleTimestamp);
    }
    let payload = frame.header.signing_payload(&frame.data);
    let sig = Signature::from_bytes(&frame.header.sig);
    ctx.verifying_key
        .verify(&payload, &sig)
        .map_err(|_| RecvError::BadSignature)?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn frame_through(
        msgno: u8,
        from: Origin,
        to: Destination,
        ts: u64,
        key: &SigningKey,
    ) -> Frame {
        sign_and_frame(
            key,
            msgno,
            from,
            to,
            ts,
            SessionId([1u8; 32]),
            b"payload".to_vec(),
        )
    }

    fn ctx<'a>(verifying_key: &'a VerifyingKey, now: u64, last_ts: Option<u64>) -> ReceiveContext<'a> {
        ReceiveContext {
            expected_msgno: 3,
            expected_from: Origin::Peer(2),
            us: Destination::Peer(1),
            verifying_key,
            last_ts,
            now,
            ts_epsilon: 5,
        }
    }

    #[test]
    fn accepts_well_formed_frame() {
        let key = SigningKey::generate(&mut OsRng);
        let vk = key.verifying_key();
        let frame = frame_through(3, Origin::Peer(2), Destination::Peer(1), 1000, &key);
        let bytes = frame.to_bytes();
        let parsed = receive(&bytes, &ctx(&vk, 1000, Some(999))).unwrap();
        assert_eq!(parsed.header.msgno, 3);
    }

    #[test]
    fn rejects_replayed_timestamp() {
        let key = SigningKey::generate(&mut OsRng);
        let vk = key.verifying_key();
        let frame = frame_through(3, Origin::Peer(2), Destination::Peer(1), 1000, &key);
        let bytes = frame.to_bytes();
        let err = receive(&bytes, &ctx(&vk, 1000, Some(1000))).unwrap_err();
        assert_eq!(err, RecvError::StaleTimestamp);
    }

    #[test]
    fn rejects_wrong_signature() {
        let key = SigningKey::generate(&mut OsRng);
        let other = SigningKey::generate(&mut OsRng);
        let frame = frame_through(3, Origin::Peer(2), Destination::Peer(1), 1000, &key);
        let bytes = frame.to_bytes();
        let err = receive(&bytes, &ctx(&other.verifying_key(), 1000, None)).unwrap_err();
        assert_eq!(err, RecvError::BadSignature);
    }

    #[test]
    fn rejects_unexpected_msgno() {
        let key = SigningKey::generate(&mut OsRng);
        let vk = key.verifying_key();
        let frame = frame_through(4, Origin::Peer(2), Destination::Peer(1), 1000, &key);
        let bytes = frame.to_bytes();
        let err = receive(&bytes, &ctx(&vk, 1000, None)).unwrap_err();
        assert_eq!(
            err,
            RecvError::UnexpectedMsgno {
                got: 4,
                expected: 3
            }
        );
    }
}
