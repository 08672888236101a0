//! Noise-XK peer channels, relayed through the TP broadcast channel.
//!
//! `snow` drives the 3-message XK handshake itself (`-> e, es`, `<- e, ee`,
//! `-> s, se`), but its [`snow::TransportState`] ratchets a fresh key per
//! message, which cannot later be handed to the TP as a single "this is the
//! session key, go decrypt the stored ciphertext" value for complaint
//! resolution. Instead, once the handshake completes we derive one static
//! exportable key via HKDF-SHA256 over the handshake hash
//! (`get_handshake_hash()`, which both ends compute identically and which is
//! bound to every handshake message exchanged) and use that key directly
//! with `chacha20poly1305`'s XChaCha20-Poly1305, plus a separate
//! key-committing HMAC-SHA-256 tag — mirroring the reference protocol's
//! `crypto_secretbox_xchacha20poly1305` + `crypto_auth_hmacsha256`
//! construction for the one-shot encrypted share payload.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key as XChaChaKey, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

const NOISE_PATTERN: &str = "Noise_XK_25519_ChaChaPoly_BLAKE2s";
const HKDF_INFO: &[u8] = b"toprf-dkg-noise-session-key-v1";
const HMAC_INFO: &[u8] = b"toprf-dkg-share-tag-v1";

/// A freshly generated static Noise keypair for one peer.
pub struct StaticKeypair {
    /// X25519 private key bytes.
    pub private: [u8; 32],
    /// X25519 public key bytes, announced to the other party out-of-band
    /// (via the TP's pk-table broadcast).
    pub public: [u8; 32],
}

/// Generate a fresh static Noise keypair.
pub fn generate_static_keypair() -> Result<StaticKeypair, snow::Error> {
    let builder = snow::Builder::new(NOISE_PATTERN.parse().expect("valid noise pattern"));
    let keypair = builder.generate_keypair()?;
    let mut private = [0u8; 32];
    let mut public = [0u8; 32];
    private.copy_from_slice(&keypair.private);
    public.copy_from_slice(&keypair.public);
    Ok(StaticKeypair { private, public })
}

/// One side of an in-progress Noise-XK handshake.
pub struct Handshake {
    state: snow::HandshakeState,
}

impl Handshake {
    /// Start the initiator side (the lower-indexed peer in an ordered pair,
    /// by this protocol's convention), given our static private key and the
    /// responder's static public key (known ahead of time, as XK requires).
    pub fn initiator(local_private: &[u8; 32], remote_public: &[u8; 32]) -> Result<Self, snow::Error> {
        let builder = snow::Builder::new(NOISE_PATTERN.parse().expect("valid noise pattern"));
        let state = builder
            .local_private_key(local_private)?
            .remote_public_key(remote_public)?
            .build_initiator()?;
        Ok(Self { state })
    }

    /// Start the responder side, given our static private key.
    pub fn responder(local_private: &[u8; 32]) -> Result<Self, snow::Error> {
        let builder = snow::Builder::new(NOISE_PATTERN.parse().expect("valid noise pattern"));
        let state = builder.local_private_key(local_private)?.build_responder()?;
        Ok(Self { state })
    }

    /// Write the next handshake message into `buf`, returning the number of
    /// bytes written. `payload` is usually empty for this protocol's use.
    pub fn write_message(&mut self, payload: &[u8], buf: &mut [u8]) -> Result<usize, snow::Error> {
        self.state.write_message(payload, buf)
    }

    /// Read the next handshake message, returning the decrypted payload
    /// length written into `buf`.
    pub fn read_message(&mut self, msg: &[u8], buf: &mut [u8]) -> Result<usize, snow::Error> {
        self.state.read_message(msg, buf)
    }

    /// `true` once all three XK messages have been exchanged.
    pub fn is_finished(&self) -> bool {
        self.state.is_handshake_finished()
    }

    /// Finish the handshake and derive the exportable session key used for
    /// the share-delivery AEAD. Consumes the handshake state.
    pub fn into_session_key(self) -> Result<SessionKey, snow::Error> {
        let hash = self.state.get_handshake_hash().to_vec();
        Ok(SessionKey::derive(&hash))
    }
}

/// The derived, exportable key for one Noise-XK session: an AEAD key plus a
/// separate HMAC key for the key-committing tag. Zeroized on drop since it
/// is secret material that the TP may later legitimately learn (via an
/// explicit peer reveal during complaint resolution), but must never leak
/// otherwise.
#[derive(ZeroizeOnDrop)]
pub struct SessionKey {
    aead_key: [u8; 32],
    hmac_key: [u8; 32],
}

impl SessionKey {
    fn derive(handshake_hash: &[u8]) -> Self {
        let hk = Hkdf::<Sha256>::new(None, handshake_hash);
        let mut aead_key = [0u8; 32];
        hk.expand(HKDF_INFO, &mut aead_key)
            .expect("32 bytes is a valid HKDF-SHA256 output length");
        let mut hmac_key = [0u8; 32];
        hk.expand(HMAC_INFO, &mut hmac_key)
            .expect("32 bytes is a valid HKDF-SHA256 output length");
        Self { aead_key, hmac_key }
    }

    /// Reconstruct a session key directly from its two raw component keys,
    /// as used when the TP replays a revealed key during complaint
    /// resolution instead of deriving it from a live handshake.
    pub fn from_raw_parts(aead_key: [u8; 32], hmac_key: [u8; 32]) -> Self {
        Self { aead_key, hmac_key }
    }

    /// The two raw component keys, as revealed by a peer during complaint
    /// resolution.
    pub fn reveal(&self) -> ([u8; 32], [u8; 32]) {
        (self.aead_key, self.hmac_key)
    }

    /// Encrypt `plaintext` under this session, returning ciphertext followed
    /// by a 32-byte key-committing HMAC-SHA-256 tag over the ciphertext.
    pub fn seal(&self, nonce: &[u8; 24], plaintext: &[u8]) -> Vec<u8> {
        let cipher = XChaCha20Poly1305::new(XChaChaKey::from_slice(&self.aead_key));
        let mut ciphertext = cipher
            .encrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: plaintext,
                    aad: &[],
                },
            )
            .expect("encryption under a freshly derived key cannot fail");
        let tag = self.tag(&ciphertext);
        ciphertext.extend_from_slice(&tag);
        ciphertext
    }

    /// Decrypt and verify a payload produced by [`Self::seal`], checking the
    /// HMAC tag before attempting AEAD decryption (so a forged tag never
    /// reaches the AEAD decrypt path).
    pub fn open(&self, nonce: &[u8; 24], sealed: &[u8]) -> Result<Vec<u8>, NoiseAeadError> {
        if sealed.len() < 32 {
            return Err(NoiseAeadError::Truncated);
        }
        let (ciphertext, tag) = sealed.split_at(sealed.len() - 32);
        let expected = self.tag(ciphertext);
        if !constant_time_eq(&expected, tag) {
            return Err(NoiseAeadError::BadTag);
        }
        let cipher = XChaCha20Poly1305::new(XChaChaKey::from_slice(&self.aead_key));
        cipher
            .decrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: &[],
                },
            )
            .map_err(|_| NoiseAeadError::BadCiphertext)
    }

    /// Test-only hook: given a payload this key already sealed, flip a
    /// ciphertext byte and recompute the tag over the corrupted ciphertext —
    /// so the tag checks out on open but AEAD decryption fails, simulating a
    /// relay that corrupts the ciphertext without touching the tag.
    #[cfg(feature = "test-support")]
    pub fn reseal_corrupted(&self, sealed: &[u8]) -> Vec<u8> {
        let ct_len = sealed.len() - 32;
        let mut corrupted = sealed.to_vec();
        corrupted[0] ^= 0xff;
        let tag = self.tag(&corrupted[..ct_len]);
        corrupted[ct_len..].copy_from_slice(&tag);
        corrupted
    }

    fn tag(&self, ciphertext: &[u8]) -> [u8; 32] {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.hmac_key)
            .expect("HMAC-SHA256 accepts any key length");
        mac.update(ciphertext);
        let mut out = [0u8; 32];
        out.copy_from_slice(&mac.finalize().into_bytes());
        out
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

/// Errors opening a sealed share payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NoiseAeadError {
    /// The sealed buffer was too short to contain a tag.
    #[error("sealed payload truncated")]
    Truncated,
    /// The HMAC-SHA-256 tag did not match.
    #[error("key-committing tag mismatch")]
    BadTag,
    /// The AEAD ciphertext did not authenticate.
    #[error("AEAD authentication failed")]
    BadCiphertext,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_handshake() -> (SessionKey, SessionKey) {
        let initiator_keys = generate_static_keypair().unwrap();
        let responder_keys = generate_static_keypair().unwrap();
        let mut initiator =
            Handshake::initiator(&initiator_keys.private, &responder_keys.public).unwrap();
        let mut responder = Handshake::responder(&responder_keys.private).unwrap();

        let mut buf1 = [0u8; 256];
        let mut buf2 = [0u8; 256];
        let mut scratch = [0u8; 256];

        let n1 = initiator.write_message(&[], &mut buf1).unwrap();
        responder.read_message(&buf1[..n1], &mut scratch).unwrap();

        let n2 = responder.write_message(&[], &mut buf2).unwrap();
        initiator.read_message(&buf2[..n2], &mut scratch).unwrap();

        let n3 = initiator.write_message(&[], &mut buf1).unwrap();
        responder.read_message(&buf1[..n3], &mut scratch).unwrap();

        assert!(initiator.is_finished());
        assert!(responder.is_finished());

        (
            initiator.into_session_key().unwrap(),
            responder.into_session_key().unwrap(),
        )
    }

    #[test]
    fn handshake_derives_matching_keys() {
        let (a, b) = run_handshake();
        assert_eq!(a.reveal(), b.reveal());
    }

    #[test]
    fn seal_open_roundtrip() {
        let (a, b) = run_handshake();
        let nonce = [7u8; 24];
        let sealed = a.seal(&nonce, b"a share payload");
        let opened = b.open(&nonce, &sealed).unwrap();
        assert_eq!(opened, b"a share payload");
    }

    #[test]
    fn tampered_tag_rejected() {
        let (a, b) = run_handshake();
        let nonce = [3u8; 24];
        let mut sealed = a.seal(&nonce, b"payload");
        let last = sealed.len() - 1;
        sealed[last] ^= 1;
        assert_eq!(b.open(&nonce, &sealed).unwrap_err(), NoiseAeadError::BadTag);
    }

    #[test]
    fn revealed_key_reopens_payload() {
        let (a, _b) = run_handshake();
        let nonce = [1u8; 24];
        let sealed = a.seal(&nonce, b"revealed");
        let (aead_key, hmac_key) = a.reveal();
        let replayed = SessionKey::from_raw_parts(aead_key, hmac_key);
        assert_eq!(replayed.open(&nonce, &sealed).unwrap(), b"revealed");
    }
}
