//! Payload structs carried inside the `data` field of a framed message.
//!
//! Peer-to-peer relayed steps (the Noise-XK handshake, the encrypted share
//! delivery) carry opaque bytes the TP never parses. Everything the TP
//! itself originates or aggregates is CBOR via `ciborium`.

use serde::{Deserialize, Serialize};

/// `msgno 0`: a peer announces its ephemeral signing key and Noise static
/// public key to the TP, signed with its long-term key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bootstrap {
    /// The peer's freshly generated ephemeral Ed25519 verifying key.
    pub ephemeral_vk: [u8; 32],
    /// The peer's freshly generated Noise-XK static public key.
    pub noise_pub: [u8; 32],
}

/// One row of the `msgno 1` pk-table the TP broadcasts once every peer has
/// bootstrapped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkTableEntry {
    /// The peer's index.
    pub index: u8,
    /// Its ephemeral verifying key.
    pub ephemeral_vk: [u8; 32],
    /// Its Noise static public key.
    pub noise_pub: [u8; 32],
}

/// `msgno 1`: the full table of participants, broadcast by the TP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkTable {
    /// One entry per participating peer, sorted by index.
    pub entries: Vec<PkTableEntry>,
}

/// `msgno 5`: a peer's Feldman commitment vector for the polynomial it is
/// dealing this run, sent to the TP for aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitmentVector {
    /// `C_0, ..., C_{t-1}`, each a compressed Ristretto255 point.
    pub commitments: Vec<[u8; 32]>,
}

/// `msgno 6`: the aggregated commitment table, broadcast by the TP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitmentTable {
    /// `(dealer index, dealer's commitment vector)`, sorted by index.
    pub entries: Vec<(u8, Vec<[u8; 32]>)>,
}

/// `msgno 8`: a peer accuses another peer of dealing it a bad share, or of
/// failing to complete the Noise-XK handshake.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Complaint {
    /// The peer being accused.
    pub accused: u8,
}

/// `msgno 9`: the aggregated complaint list, broadcast by the TP so every
/// peer knows which session keys it must reveal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplaintTable {
    /// `(accuser, accused)` pairs, in the order complaints were received.
    pub entries: Vec<(u8, u8)>,
}

/// `msgno 10`: a peer reveals the Noise-XK session key it shares with
/// `with_peer`, sent only in response to a complaint naming that pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reveal {
    /// The other endpoint of the revealed session.
    pub with_peer: u8,
    /// The revealed AEAD key.
    pub aead_key: [u8; 32],
    /// The revealed HMAC key.
    pub hmac_key: [u8; 32],
}

/// `msgno 12`: the TP's final announcement once the run concludes, whether
/// successfully or with an unrecoverable threshold loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conclusion {
    /// The combined joint public key, compressed, present iff the run
    /// succeeded.
    pub public_key: Option<[u8; 32]>,
    /// Every cheater identified during the run.
    pub cheaters: Vec<toprf_types::Cheater>,
}

/// Serialize `value` as CBOR.
pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out).expect("CBOR encoding of a fixed protocol type cannot fail");
    out
}

/// Deserialize CBOR bytes into `T`.
pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, ciborium::de::Error<std::io::Error>> {
    ciborium::from_reader(bytes)
}
