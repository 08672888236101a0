//! Peer-side state machine: deals a contribution to the joint secret,
//! verifies what it receives from every other peer, and files a complaint
//! whenever verification or a Noise-XK handshake fails.

use crate::envelope::{self, ReceiveContext};
use crate::error::{PeerError, StepError};
use crate::messages::{self, Bootstrap, CommitmentTable, CommitmentVector, Complaint, ComplaintTable, Conclusion, PkTable, Reveal};
use crate::noise::{Handshake, SessionKey, StaticKeypair};
use crate::{feldman, tp, DkgParams};
use ed25519_dalek::{SigningKey, VerifyingKey};
use std::collections::BTreeMap;
use toprf_core::group::{Point, Scalar};
use toprf_core::shamir::evaluate_poly;
use toprf_types::wire::{Destination, Frame, Origin};
use toprf_types::{Cheater, PartyIndex, SessionId};

/// The macro-step a peer is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStep {
    /// Waiting for the TP's pk-table broadcast.
    AwaitingPkTable,
    /// Running the Noise-XK handshakes against every other peer.
    Handshaking,
    /// Waiting for the TP's aggregated commitment table.
    AwaitingCommitmentTable,
    /// Delivering and verifying encrypted shares.
    ShareExchange,
    /// Waiting for the TP's aggregated complaint table.
    AwaitingComplaintTable,
    /// Waiting for the TP's final conclusion.
    AwaitingConclusion,
    /// The run concluded.
    Done,
}

/// Key the TP's entry under in `PeerState::last_ts`, matching
/// `Origin::Tp::to_byte()` so the TP and every peer index share one flat
/// per-sender timestamp map.
const TP_SENDER_KEY: u8 = 0;

enum HandshakeSlot {
    Initiating(Handshake),
    Responding(Handshake),
    Established(SessionKey),
}

/// Peer side of one DKG run.
pub struct PeerState {
    index: PartyIndex,
    params: DkgParams,
    session_id: SessionId,
    long_term_signing_key: SigningKey,
    tp_verifying_key: VerifyingKey,
    ephemeral_signing_key: SigningKey,
    noise_keys: StaticKeypair,
    step: PeerStep,
    sent_bootstrap: bool,
    table: BTreeMap<u8, messages::PkTableEntry>,
    handshakes: BTreeMap<u8, HandshakeSlot>,
    own_coeffs: Vec<Scalar>,
    own_commitments: Vec<Point>,
    commitment_table: BTreeMap<u8, Vec<Point>>,
    sent_own_commitments: bool,
    received_shares: BTreeMap<u8, Scalar>,
    sent_shares: std::collections::BTreeSet<u8>,
    filed_complaints: std::collections::BTreeSet<u8>,
    complaint_table: Vec<(u8, u8)>,
    sent_reveal_round: bool,
    transcript: crate::transcript::Transcript,
    final_share: Option<Scalar>,
    public_key: Option<Point>,
    cheaters: Vec<Cheater>,
    last_ts: BTreeMap<u8, u64>,
    #[cfg(feature = "test-support")]
    bad_share_target: Option<u8>,
    #[cfg(feature = "test-support")]
    corrupt_ciphertext_target: Option<(u8, CiphertextFault)>,
    #[cfg(feature = "test-support")]
    forced_complaint: Option<u8>,
    #[cfg(feature = "test-support")]
    forced_reveal: Option<u8>,
    #[cfg(feature = "test-support")]
    gone_silent: bool,
}

/// Which way a test run wants a dealt share's sealed payload broken, so the
/// TP's later complaint resolution fails at the AEAD layer rather than at
/// Feldman verification.
#[cfg(feature = "test-support")]
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum CiphertextFault {
    /// Flip a tag byte, so the revealed key's recomputed tag won't match.
    BadTag,
    /// Flip a ciphertext byte and recompute the tag over it, so the tag
    /// checks out but AEAD decryption under the revealed key fails.
    BadCiphertext,
}

impl PeerState {
    /// Start a fresh peer, sampling its own Shamir polynomial contribution
    /// and Noise-XK static keypair.
    pub fn start<R: rand::RngCore + rand::CryptoRng>(
        index: PartyIndex,
        params: DkgParams,
        session_id: SessionId,
        long_term_signing_key: SigningKey,
        tp_verifying_key: VerifyingKey,
        rng: &mut R,
    ) -> Result<Self, PeerError> {
        let noise_keys = crate::noise::generate_static_keypair()?;
        let own_coeffs: Vec<Scalar> = (0..params.t).map(|_| Scalar::random(rng)).collect();
        let own_commitments = feldman::commit(&own_coeffs);
        Ok(Self {
            index,
            params,
            session_id,
            long_term_signing_key,
            tp_verifying_key,
            ephemeral_signing_key: SigningKey::generate(rng),
            noise_keys,
            step: PeerStep::AwaitingPkTable,
            sent_bootstrap: false,
            table: BTreeMap::new(),
            handshakes: BTreeMap::new(),
            own_coeffs,
            own_commitments,
            commitment_table: BTreeMap::new(),
            sent_own_commitments: false,
            received_shares: BTreeMap::new(),
            sent_shares: Default::default(),
            filed_complaints: Default::default(),
            complaint_table: Vec::new(),
            sent_reveal_round: false,
            transcript: crate::transcript::Transcript::new(session_id),
            final_share: None,
            public_key: None,
            cheaters: Vec::new(),
            last_ts: BTreeMap::new(),
            #[cfg(feature = "test-support")]
            bad_share_target: None,
            #[cfg(feature = "test-support")]
            corrupt_ciphertext_target: None,
            #[cfg(feature = "test-support")]
            forced_complaint: None,
            #[cfg(feature = "test-support")]
            forced_reveal: None,
            #[cfg(feature = "test-support")]
            gone_silent: false,
        })
    }

    /// Test-only hook: make the share this peer deals to `victim` fail
    /// Feldman verification, without touching the broadcast commitments —
    /// simulating a dealer that ships an inconsistent share.
    #[cfg(feature = "test-support")]
    pub fn test_corrupt_share_to(&mut self, victim: u8) {
        self.bad_share_target = Some(victim);
    }

    /// Test-only hook: relay a tampered sealed payload to `victim` instead of
    /// the genuine one, so the TP's later complaint resolution fails at the
    /// AEAD layer (a bad tag or a bad ciphertext) rather than at Feldman
    /// verification — simulating a corrupted relay rather than a bad dealer.
    #[cfg(feature = "test-support")]
    pub fn test_corrupt_ciphertext_to(&mut self, victim: u8, fault: CiphertextFault) {
        self.corrupt_ciphertext_target = Some((victim, fault));
    }

    /// Test-only hook: file a complaint against `accused` regardless of
    /// whether the share this peer received from them actually verified —
    /// simulating a false accusation.
    #[cfg(feature = "test-support")]
    pub fn test_force_complaint(&mut self, accused: u8) {
        self.forced_complaint = Some(accused);
    }

    /// Test-only hook: additionally reveal the session key shared with
    /// `with_peer` during the reveal round, regardless of whether any
    /// complaint named that pair — simulating an over-reveal.
    #[cfg(feature = "test-support")]
    pub fn test_force_reveal(&mut self, with_peer: u8) {
        self.forced_reveal = Some(with_peer);
    }

    /// Test-only hook: never respond to the reveal round at all, even if
    /// accused — simulating a peer that goes silent instead of cooperating
    /// with complaint resolution.
    #[cfg(feature = "test-support")]
    pub fn test_go_silent(&mut self) {
        self.gone_silent = true;
    }

    /// `false` once the run has concluded.
    pub fn not_done(&self) -> bool {
        self.step != PeerStep::Done
    }

    /// This peer's reconstructed long-lived share, once the run concludes
    /// successfully.
    pub fn final_share(&self) -> Option<&Scalar> {
        self.final_share.as_ref()
    }

    /// The joint public key, once the run concludes successfully.
    pub fn public_key(&self) -> Option<&Point> {
        self.public_key.as_ref()
    }

    /// Every cheater the TP announced in its conclusion.
    pub fn cheaters(&self) -> &[Cheater] {
        &self.cheaters
    }

    /// Explicitly release every Noise-XK session this peer holds, zeroizing
    /// each session's AEAD/HMAC key material. Callers should call this
    /// before dropping a `PeerState` whose run has concluded; it also runs
    /// automatically on drop as a backstop.
    pub fn release_sessions(&mut self) {
        self.handshakes.clear();
    }

    fn sign_to(&self, msgno: u8, data: Vec<u8>, ts: u64, long_term: bool) -> Frame {
        let key = if long_term {
            &self.long_term_signing_key
        } else {
            &self.ephemeral_signing_key
        };
        envelope::sign_and_frame(
            key,
            msgno,
            Origin::Peer(self.index.0),
            Destination::Tp,
            ts,
            self.session_id,
            data,
        )
    }

    fn sign_to_peer(&self, msgno: u8, to: u8, data: Vec<u8>, ts: u64) -> Frame {
        envelope::sign_and_frame(
            &self.ephemeral_signing_key,
            msgno,
            Origin::Peer(self.index.0),
            Destination::Peer(to),
            ts,
            self.session_id,
            data,
        )
    }

    fn verify_from_tp(&mut self, frame: &Frame, expected_msgno: u8, now: u64) -> Result<(), PeerError> {
        let last_ts = self.last_ts.get(&TP_SENDER_KEY).copied();
        envelope::receive(
            &frame.to_bytes(),
            &ReceiveContext {
                expected_msgno,
                expected_from: Origin::Tp,
                us: Destination::Peer(self.index.0),
                verifying_key: &self.tp_verifying_key,
                last_ts,
                now,
                ts_epsilon: self.params.ts_epsilon,
            },
        )
        .map_err(StepError::from)?;
        self.last_ts.insert(TP_SENDER_KEY, frame.header.ts);
        Ok(())
    }

    fn peer_verifying_key(&self, peer: u8) -> Option<VerifyingKey> {
        self.table
            .get(&peer)
            .and_then(|e| VerifyingKey::from_bytes(&e.ephemeral_vk).ok())
    }

    /// Feed every frame received since the last call, advance as far as
    /// possible, and return the frames to send out.
    #[tracing::instrument(level = "debug", skip_all, fields(peer = self.index.0, step = ?self.step))]
    pub fn next(&mut self, inbox: Vec<Frame>, now: u64) -> Result<Vec<Frame>, PeerError> {
        for frame in &inbox {
            self.transcript.update(&frame.header.to_bytes());
            self.transcript.update(&frame.data);
        }
        let mut out = Vec::new();
        if !self.sent_bootstrap {
            let bootstrap = Bootstrap {
                ephemeral_vk: self.ephemeral_signing_key.verifying_key().to_bytes(),
                noise_pub: self.noise_keys.public,
            };
            let frame = self.sign_to(0, messages::encode(&bootstrap), now, true);
            self.transcript.update(&frame.header.to_bytes());
            self.transcript.update(&frame.data);
            out.push(frame);
            self.sent_bootstrap = true;
        }
        match self.step {
            PeerStep::AwaitingPkTable => self.step_pk_table(inbox, now, &mut out)?,
            PeerStep::Handshaking => self.step_handshakes(inbox, now, &mut out)?,
            PeerStep::AwaitingCommitmentTable => self.step_commitment_table(inbox, now, &mut out)?,
            PeerStep::ShareExchange => self.step_share_exchange(inbox, now, &mut out)?,
            PeerStep::AwaitingComplaintTable => self.step_complaint_table(inbox, now, &mut out)?,
            PeerStep::AwaitingConclusion => self.step_conclusion(inbox, now)?,
            PeerStep::Done => {}
        }
        for frame in &out {
            self.transcript.update(&frame.header.to_bytes());
            self.transcript.update(&frame.data);
        }
        Ok(out)
    }

    fn step_pk_table(&mut self, inbox: Vec<Frame>, now: u64, out: &mut Vec<Frame>) -> Result<(), PeerError> {
        for frame in inbox {
            if frame.header.msgno != 1 {
                continue;
            }
            self.verify_from_tp(&frame, 1, now)?;
            let table: PkTable = messages::decode(&frame.data).map_err(|_| StepError::OutOfOrder)?;
            for entry in table.entries {
                self.table.insert(entry.index, entry);
            }
        }
        if self.table.len() < self.params.n as usize {
            return Ok(());
        }
        for &peer in self.table.keys() {
            if peer == self.index.0 {
                continue;
            }
            if self.index.0 < peer {
                let remote_pub = self.table[&peer].noise_pub;
                let mut handshake = Handshake::initiator(&self.noise_keys.private, &remote_pub)?;
                let mut buf = [0u8; 256];
                let n = handshake.write_message(&[], &mut buf)?;
                out.push(self.sign_to_peer(2, peer, buf[..n].to_vec(), now));
                self.handshakes.insert(peer, HandshakeSlot::Initiating(handshake));
            } else {
                let handshake = Handshake::responder(&self.noise_keys.private)?;
                self.handshakes.insert(peer, HandshakeSlot::Responding(handshake));
            }
        }
        self.step = PeerStep::Handshaking;
        Ok(())
    }

    fn step_handshakes(&mut self, inbox: Vec<Frame>, now: u64, out: &mut Vec<Frame>) -> Result<(), PeerError> {
        for frame in inbox {
            if !matches!(frame.header.msgno, 2 | 3 | 4) {
                continue;
            }
            let Origin::Peer(sender) = frame.header.from else {
                continue;
            };
            let Some(vk) = self.peer_verifying_key(sender) else {
                continue;
            };
            let last_ts = self.last_ts.get(&sender).copied();
            envelope::receive(
                &frame.to_bytes(),
                &ReceiveContext {
                    expected_msgno: frame.header.msgno,
                    expected_from: Origin::Peer(sender),
                    us: Destination::Peer(self.index.0),
                    verifying_key: &vk,
                    last_ts,
                    now,
                    ts_epsilon: self.params.ts_epsilon,
                },
            )
            .map_err(StepError::from)?;
            self.last_ts.insert(sender, frame.header.ts);

            let mut scratch = [0u8; 256];
            match self.handshakes.remove(&sender) {
                Some(HandshakeSlot::Responding(mut handshake)) if frame.header.msgno == 2 => {
                    handshake.read_message(&frame.data, &mut scratch)?;
                    let mut buf = [0u8; 256];
                    let n = handshake.write_message(&[], &mut buf)?;
                    out.push(self.sign_to_peer(3, sender, buf[..n].to_vec(), now));
                    self.handshakes.insert(sender, HandshakeSlot::Responding(handshake));
                }
                Some(HandshakeSlot::Initiating(mut handshake)) if frame.header.msgno == 3 => {
                    handshake.read_message(&frame.data, &mut scratch)?;
                    let mut buf = [0u8; 256];
                    let n = handshake.write_message(&[], &mut buf)?;
                    out.push(self.sign_to_peer(4, sender, buf[..n].to_vec(), now));
                    let key = handshake.into_session_key()?;
                    self.handshakes.insert(sender, HandshakeSlot::Established(key));
                }
                Some(HandshakeSlot::Responding(mut handshake)) if frame.header.msgno == 4 => {
                    handshake.read_message(&frame.data, &mut scratch)?;
                    let key = handshake.into_session_key()?;
                    self.handshakes.insert(sender, HandshakeSlot::Established(key));
                }
                Some(other) => {
                    self.handshakes.insert(sender, other);
                }
                None => {}
            }
        }
        let all_established = self
            .handshakes
            .values()
            .all(|slot| matches!(slot, HandshakeSlot::Established(_)));
        if all_established && self.handshakes.len() == (self.params.n as usize - 1) {
            let frame = self.sign_to(
                5,
                messages::encode(&CommitmentVector {
                    commitments: self.own_commitments.iter().map(|c| c.to_bytes()).collect(),
                }),
                now,
                false,
            );
            out.push(frame);
            self.step = PeerStep::AwaitingCommitmentTable;
        }
        Ok(())
    }

    fn step_commitment_table(&mut self, inbox: Vec<Frame>, now: u64, out: &mut Vec<Frame>) -> Result<(), PeerError> {
        for frame in inbox {
            if frame.header.msgno != 6 {
                continue;
            }
            self.verify_from_tp(&frame, 6, now)?;
            let table: CommitmentTable = messages::decode(&frame.data).map_err(|_| StepError::OutOfOrder)?;
            for (dealer, points) in table.entries {
                let decoded: Result<Vec<Point>, _> =
                    points.iter().map(|b| Point::from_bytes(b)).collect();
                self.commitment_table.insert(dealer, decoded.map_err(toprf_core::Error::from)?);
            }
        }
        if self.commitment_table.len() < self.params.n as usize {
            return Ok(());
        }
        self.sent_own_commitments = true;
        for &peer in self.table.keys() {
            if peer == self.index.0 || self.sent_shares.contains(&peer) {
                continue;
            }
            let mut share = evaluate_poly(&self.own_coeffs, Scalar::from_u64(peer as u64));
            #[cfg(feature = "test-support")]
            if self.bad_share_target == Some(peer) {
                share = share + Scalar::one();
            }
            let HandshakeSlot::Established(key) = self
                .handshakes
                .get(&peer)
                .expect("handshake established before commitment exchange")
            else {
                continue;
            };
            let nonce = tp::share_nonce(self.session_id, self.index.0, peer);
            #[cfg_attr(not(feature = "test-support"), allow(unused_mut))]
            let mut sealed = key.seal(&nonce, &share.to_bytes());
            #[cfg(feature = "test-support")]
            if self.corrupt_ciphertext_target == Some((peer, CiphertextFault::BadTag)) {
                let last = sealed.len() - 1;
                sealed[last] ^= 0xff;
            }
            #[cfg(feature = "test-support")]
            if self.corrupt_ciphertext_target == Some((peer, CiphertextFault::BadCiphertext)) {
                sealed = key.reseal_corrupted(&sealed);
            }
            out.push(self.sign_to_peer(7, peer, sealed, now));
            self.sent_shares.insert(peer);
        }
        self.step = PeerStep::ShareExchange;
        Ok(())
    }

    fn step_share_exchange(&mut self, inbox: Vec<Frame>, now: u64, out: &mut Vec<Frame>) -> Result<(), PeerError> {
        for frame in inbox {
            if frame.header.msgno != 7 {
                continue;
            }
            let Origin::Peer(dealer) = frame.header.from else {
                continue;
            };
            let Some(vk) = self.peer_verifying_key(dealer) else {
                continue;
            };
            let last_ts = self.last_ts.get(&dealer).copied();
            envelope::receive(
                &frame.to_bytes(),
                &ReceiveContext {
                    expected_msgno: 7,
                    expected_from: Origin::Peer(dealer),
                    us: Destination::Peer(self.index.0),
                    verifying_key: &vk,
                    last_ts,
                    now,
                    ts_epsilon: self.params.ts_epsilon,
                },
            )
            .map_err(StepError::from)?;
            self.last_ts.insert(dealer, frame.header.ts);
            let Some(HandshakeSlot::Established(key)) = self.handshakes.get(&dealer) else {
                continue;
            };
            let nonce = tp::share_nonce(self.session_id, dealer, self.index.0);
            let verified = match key.open(&nonce, &frame.data) {
                Ok(plain) if plain.len() == 32 => {
                    let mut bytes = [0u8; 32];
                    bytes.copy_from_slice(&plain);
                    Scalar::from_canonical_bytes(bytes).filter(|share| {
                        self.commitment_table
                            .get(&dealer)
                            .is_some_and(|c| feldman::verify(c, self.index.0, share))
                    })
                }
                _ => None,
            };
            match verified {
                Some(share) => {
                    self.received_shares.insert(dealer, share);
                }
                None if !self.filed_complaints.contains(&dealer) => {
                    self.filed_complaints.insert(dealer);
                }
                None => {}
            }
        }
        let all_peers: Vec<u8> = self.table.keys().copied().filter(|&p| p != self.index.0).collect();
        let have_all = all_peers
            .iter()
            .all(|p| self.received_shares.contains_key(p) || self.filed_complaints.contains(p));
        if have_all {
            let mut accusations = self.filed_complaints.clone();
            #[cfg(feature = "test-support")]
            if let Some(accused) = self.forced_complaint {
                accusations.insert(accused);
            }
            // Each complaint is its own signed frame to the TP; tick the
            // timestamp so filing more than one in the same round still
            // satisfies per-sender monotonicity.
            let mut ts = now;
            for &accused in &accusations {
                let frame = self.sign_to(8, messages::encode(&Complaint { accused }), ts, false);
                out.push(frame);
                ts += 1;
            }
            self.step = PeerStep::AwaitingComplaintTable;
        }
        Ok(())
    }

    fn step_complaint_table(&mut self, inbox: Vec<Frame>, now: u64, out: &mut Vec<Frame>) -> Result<(), PeerError> {
        for frame in inbox {
            if frame.header.msgno != 9 {
                continue;
            }
            self.verify_from_tp(&frame, 9, now)?;
            let table: ComplaintTable = messages::decode(&frame.data).map_err(|_| StepError::OutOfOrder)?;
            self.complaint_table = table.entries;
        }
        if self.sent_reveal_round {
            return Ok(());
        }
        #[cfg(feature = "test-support")]
        if self.gone_silent {
            return Ok(());
        }
        // Only the accused side of a complaint pair reveals; an accuser
        // never reveals its own session key.
        #[allow(unused_mut)]
        let mut involved: Vec<u8> = self
            .complaint_table
            .iter()
            .filter(|&&(_a, b)| b == self.index.0)
            .map(|&(a, _b)| a)
            .collect();
        #[cfg(feature = "test-support")]
        if let Some(with_peer) = self.forced_reveal {
            if !involved.contains(&with_peer) {
                involved.push(with_peer);
            }
        }
        // Reveals (msgno 10) and the closing digest (msgno 11) below are all
        // signed to the TP in this one call; tick the timestamp across them
        // so per-sender monotonicity holds even when this peer is accused by
        // more than one other peer in the same round.
        let mut ts = now;
        if !involved.is_empty() || !self.complaint_table.is_empty() {
            for with_peer in involved {
                if let Some(HandshakeSlot::Established(key)) = self.handshakes.get(&with_peer) {
                    let (aead_key, hmac_key) = key.reveal();
                    let reveal = Reveal {
                        with_peer,
                        aead_key,
                        hmac_key,
                    };
                    out.push(self.sign_to(10, messages::encode(&reveal), ts, false));
                    ts += 1;
                }
            }
        }
        let digest = self.transcript.digest();
        out.push(self.sign_to(11, digest.to_vec(), ts, false));
        self.sent_reveal_round = true;
        self.step = PeerStep::AwaitingConclusion;
        Ok(())
    }

    fn step_conclusion(&mut self, inbox: Vec<Frame>, now: u64) -> Result<(), PeerError> {
        for frame in inbox {
            if frame.header.msgno != 12 {
                continue;
            }
            self.verify_from_tp(&frame, 12, now)?;
            let conclusion: Conclusion = messages::decode(&frame.data).map_err(|_| StepError::OutOfOrder)?;
            self.cheaters = conclusion.cheaters;
            if let Some(pk_bytes) = conclusion.public_key {
                self.public_key = Point::from_bytes(&pk_bytes).ok();
            }
            let own_contribution = evaluate_poly(&self.own_coeffs, Scalar::from_u64(self.index.0 as u64));
            let cheating: std::collections::BTreeSet<u8> =
                self.cheaters.iter().map(|c| c.peer.0).collect();
            let total = self
                .received_shares
                .iter()
                .filter(|&(dealer, _)| !cheating.contains(dealer))
                .fold(own_contribution, |acc, (_, share)| acc + *share);
            self.final_share = Some(total);
            self.step = PeerStep::Done;
            self.release_sessions();
        }
        Ok(())
    }
}

impl Drop for PeerState {
    fn drop(&mut self) {
        self.release_sessions();
    }
}
