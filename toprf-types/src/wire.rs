//! The message envelope framing every TP-DKG protocol message.
//!
//! Wire layout (order matters, it is exactly what gets signed):
//! `sig(64) || msgno(1) || len(4 LE) || from(1) || to(1) || ts(8 LE) ||
//! session_id(32) || data[..]`.
//!
//! `len` counts the entire framed message, header included. All multi-byte
//! integers are little-endian. This module only builds/parses the header —
//! signing and the freshness/signature receive-check live in `toprf-dkg`,
//! which is the layer that actually holds signing/verification keys.

use crate::SessionId;
use serde::{Deserialize, Serialize};

/// Size of the signature field, bytes (Ed25519-style detached signature).
pub const SIG_BYTES: usize = 64;
/// Total size of the fixed-length envelope header, before `data`.
pub const HEADER_BYTES: usize = SIG_BYTES + 1 + 4 + 1 + 1 + 8 + 32;

/// The addressee of a framed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Destination {
    /// The trusted party, wire value `0`.
    Tp,
    /// All peers, wire value `0xFF`.
    Broadcast,
    /// A specific peer index in `[1, n]`.
    Peer(u8),
}

impl Destination {
    /// Encode as the wire `to` byte.
    pub fn to_byte(self) -> u8 {
        match self {
            Destination::Tp => 0,
            Destination::Broadcast => 0xFF,
            Destination::Peer(i) => i,
        }
    }

    /// Decode a wire `to` byte.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Destination::Tp,
            0xFF => Destination::Broadcast,
            i => Destination::Peer(i),
        }
    }
}

/// The sender of a framed message: the TP (`from = 0`) or a peer index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// The trusted party.
    Tp,
    /// A specific peer index in `[1, n]`.
    Peer(u8),
}

impl Origin {
    /// Encode as the wire `from` byte.
    pub fn to_byte(self) -> u8 {
        match self {
            Origin::Tp => 0,
            Origin::Peer(i) => i,
        }
    }

    /// Decode a wire `from` byte.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Origin::Tp,
            i => Origin::Peer(i),
        }
    }
}

/// The header of a framed TP-DKG message, everything but `data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Detached signature over `header_without_sig || session_id || data`.
    pub sig: [u8; SIG_BYTES],
    /// Protocol step this message belongs to.
    pub msgno: u8,
    /// Length of the entire framed message, header included.
    pub len: u32,
    /// Sender.
    pub from: Origin,
    /// Recipient.
    pub to: Destination,
    /// Seconds since the Unix epoch, used for the freshness check.
    pub ts: u64,
    /// Session this message belongs to.
    pub session_id: SessionId,
}

impl Header {
    /// Serialize the header (without `data`) to its wire bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_BYTES] {
        let mut out = [0u8; HEADER_BYTES];
        let mut offset = 0;
        out[offset..offset + SIG_BYTES].copy_from_slice(&self.sig);
        offset += SIG_BYTES;
        out[offset] = self.msgno;
        offset += 1;
        out[offset..offset + 4].copy_from_slice(&self.len.to_le_bytes());
        offset += 4;
        out[offset] = self.from.to_byte();
        offset += 1;
        out[offset] = self.to.to_byte();
        offset += 1;
        out[offset..offset + 8].copy_from_slice(&self.ts.to_le_bytes());
        offset += 8;
        out[offset..offset + 32].copy_from_slice(&self.session_id.0);
        out
    }

    /// Parse a header from its wire bytes. Does not validate `len` against
    /// the buffer the header was sliced from — callers check that.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_BYTES {
            return None;
        }
        let mut sig = [0u8; SIG_BYTES];
        sig.copy_from_slice(&bytes[0..SIG_BYTES]);
        let mut offset = SIG_BYTES;
        let msgno = bytes[offset];
        offset += 1;
        let len = u32::from_le_bytes(bytes[offset..offset + 4].try_into().ok()?);
        offset += 4;
        let from = Origin::from_byte(bytes[offset]);
        offset += 1;
        let to = Destination::from_byte(bytes[offset]);
        offset += 1;
        let ts = u64::from_le_bytes(bytes[offset..offset + 8].try_into().ok()?);
        offset += 8;
        let mut session_id = [0u8; 32];
        session_id.copy_from_slice(&bytes[offset..offset + 32]);
        Some(Self {
            sig,
            msgno,
            len,
            from,
            to,
            ts,
            session_id: SessionId(session_id),
        })
    }

    /// The bytes that get signed: the header with a zeroed signature field,
    /// followed by `data`. The session id is included in the header itself
    /// (not appended separately, unlike the original ABI's side-channel
    /// session id) since this crate always frames it inline.
    pub fn signing_payload(&self, data: &[u8]) -> Vec<u8> {
        let mut unsigned = *self;
        unsigned.sig = [0u8; SIG_BYTES];
        let mut out = Vec::with_capacity(HEADER_BYTES + data.len());
        out.extend_from_slice(&unsigned.to_bytes());
        out.extend_from_slice(data);
        out
    }
}

/// A fully framed message: header plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The message header.
    pub header: Header,
    /// The message payload.
    pub data: Vec<u8>,
}

impl Frame {
    /// Serialize the entire frame to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_BYTES + self.data.len());
        out.extend_from_slice(&self.header.to_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Parse a frame from wire bytes, checking that `header.len` matches
    /// the supplied buffer's length.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let header = Header::from_bytes(bytes)?;
        if header.len as usize != bytes.len() {
            return None;
        }
        Some(Self {
            header,
            data: bytes[HEADER_BYTES..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = Header {
            sig: [7u8; SIG_BYTES],
            msgno: 5,
            len: (HEADER_BYTES + 3) as u32,
            from: Origin::Peer(2),
            to: Destination::Broadcast,
            ts: 1_700_000_000,
            session_id: SessionId([9u8; 32]),
        };
        let bytes = header.to_bytes();
        let parsed = Header::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn frame_roundtrip() {
        let header = Header {
            sig: [0u8; SIG_BYTES],
            msgno: 1,
            len: (HEADER_BYTES + 4) as u32,
            from: Origin::Tp,
            to: Destination::Peer(3),
            ts: 42,
            session_id: SessionId([1u8; 32]),
        };
        let frame = Frame {
            header,
            data: vec![1, 2, 3, 4],
        };
        let bytes = frame.to_bytes();
        let parsed = Frame::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn destination_roundtrip() {
        assert_eq!(Destination::from_byte(Destination::Tp.to_byte()), Destination::Tp);
        assert_eq!(
            Destination::from_byte(Destination::Broadcast.to_byte()),
            Destination::Broadcast
        );
        assert_eq!(
            Destination::from_byte(Destination::Peer(5).to_byte()),
            Destination::Peer(5)
        );
    }
}
