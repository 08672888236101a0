//! The trusted-party state machine: relays every message, aggregates public
//! data (the pk-table, commitment table, complaint table), and resolves
//! complaints by replaying revealed session keys — without ever holding or
//! deriving the joint secret itself.

use crate::envelope::{self, ReceiveContext};
use crate::error::{StepError, TpError};
use crate::messages::{self, Bootstrap, ComplaintTable, Conclusion, PkTable, PkTableEntry};
use crate::noise::{NoiseAeadError, SessionKey};
use crate::transcript::Transcript;
use crate::{feldman, DkgParams};
use ed25519_dalek::{SigningKey, VerifyingKey};
use std::collections::BTreeMap;
use toprf_core::group::Point;
use toprf_types::wire::{Destination, Frame, Origin};
use toprf_types::{Cheater, PartyIndex, SessionId};

/// The macro-step the TP is currently waiting on input for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpStep {
    /// Waiting for every peer's `msgno 0` bootstrap.
    Bootstrap,
    /// Relaying the three Noise-XK handshake messages between every ordered
    /// peer pair (`msgno 2..4`).
    NoiseRelay {
        /// Which of the three handshake messages this round relays.
        round: u8,
    },
    /// Waiting for every peer's `msgno 5` commitment vector.
    Commitments,
    /// Relaying encrypted share deliveries between every ordered peer pair
    /// (`msgno 7`).
    ShareRelay,
    /// Collecting complaints (`msgno 8`).
    Complaints,
    /// Collecting reveals for any filed complaint (`msgno 10`).
    Reveals,
    /// Collecting signed transcript digests (`msgno 11`).
    TranscriptCheck,
    /// The run concluded; `not_done` returns `false`.
    Done,
}

struct RelayedShare {
    data: Vec<u8>,
}

/// Trusted-party side of one DKG run.
pub struct TpState {
    params: DkgParams,
    session_id: SessionId,
    signing_key: SigningKey,
    peer_long_term_keys: BTreeMap<u8, VerifyingKey>,
    step: TpStep,
    bootstrapped: BTreeMap<u8, Bootstrap>,
    commitments: BTreeMap<u8, Vec<Point>>,
    relayed_shares: BTreeMap<(u8, u8), RelayedShare>,
    complaints: Vec<(u8, u8)>,
    reveals: BTreeMap<(u8, u8), (SessionKey, PartyIndex)>,
    reveals_opened_at: Option<u64>,
    digests: BTreeMap<u8, [u8; 32]>,
    transcript: Transcript,
    cheaters: Vec<Cheater>,
    last_ts: BTreeMap<u8, u64>,
}

const NOISE_ROUNDS: u8 = 3;

/// How long the TP waits, once the reveal round opens, for every complaint
/// to get a matching reveal before disqualifying whichever accused peer
/// never responded. Deliberately independent of `ts_epsilon` (freshness
/// tolerance): a peer going silent and a peer's clock drifting are
/// different failure modes and shouldn't share a threshold.
const REVEAL_TIMEOUT_SECS: u64 = 30;

impl TpState {
    /// Start a fresh run. `peer_long_term_keys` is the set of participants'
    /// durable identity keys, known to the TP ahead of time (out-of-band
    /// registration is outside this crate's scope).
    pub fn start(
        params: DkgParams,
        session_id: SessionId,
        signing_key: SigningKey,
        peer_long_term_keys: BTreeMap<u8, VerifyingKey>,
    ) -> Result<Self, TpError> {
        if peer_long_term_keys.len() != params.n as usize {
            return Err(TpError::InvalidParams {
                n: params.n as u16,
                t: params.t as u16,
            });
        }
        Ok(Self {
            params,
            session_id,
            signing_key,
            peer_long_term_keys,
            step: TpStep::Bootstrap,
            bootstrapped: BTreeMap::new(),
            commitments: BTreeMap::new(),
            relayed_shares: BTreeMap::new(),
            complaints: Vec::new(),
            reveals: BTreeMap::new(),
            reveals_opened_at: None,
            digests: BTreeMap::new(),
            transcript: Transcript::new(session_id),
            cheaters: Vec::new(),
            last_ts: BTreeMap::new(),
        })
    }

    /// `false` once the run has reached [`TpStep::Done`].
    pub fn not_done(&self) -> bool {
        self.step != TpStep::Done
    }

    /// The current step.
    pub fn step(&self) -> TpStep {
        self.step
    }

    /// Every cheater identified so far.
    pub fn cheaters(&self) -> &[Cheater] {
        &self.cheaters
    }

    fn honest_remaining(&self) -> u8 {
        let accused: std::collections::BTreeSet<u8> =
            self.cheaters.iter().map(|c| c.peer.0).collect();
        (self.params.n as usize - accused.len()) as u8
    }

    fn check_threshold(&mut self) -> Result<(), TpError> {
        let remaining = self.honest_remaining();
        if remaining < self.params.t {
            return Err(TpError::Step(StepError::ThresholdLost {
                remaining,
                threshold: self.params.t,
            }));
        }
        Ok(())
    }

    /// Feed the TP every frame received since the last call, advance as far
    /// as possible, and return the frames it wants sent out (to specific
    /// peers or to everyone).
    #[tracing::instrument(level = "debug", skip_all, fields(step = ?self.step))]
    pub fn next(&mut self, inbox: Vec<Frame>, now: u64) -> Result<Vec<Frame>, TpError> {
        for frame in &inbox {
            self.transcript.update(&frame.header.to_bytes());
            self.transcript.update(&frame.data);
        }
        match self.step {
            TpStep::Bootstrap => self.step_bootstrap(inbox, now),
            TpStep::NoiseRelay { round } => self.step_noise_relay(round, inbox),
            TpStep::Commitments => self.step_commitments(inbox, now),
            TpStep::ShareRelay => self.step_share_relay(inbox),
            TpStep::Complaints => self.step_complaints(inbox, now),
            TpStep::Reveals => self.step_reveals(inbox, now),
            TpStep::TranscriptCheck => self.step_transcript_check(inbox, now),
            TpStep::Done => Ok(Vec::new()),
        }
    }

    fn verify_from_peer(
        &mut self,
        frame: &Frame,
        expected_msgno: u8,
        now: u64,
    ) -> Result<u8, TpError> {
        let Origin::Peer(index) = frame.header.from else {
            return Err(TpError::Step(StepError::Recv(
                crate::error::RecvError::UnexpectedFrom { got: 0 },
            )));
        };
        let vk = *self
            .peer_long_term_keys
            .get(&index)
            .ok_or(TpError::Step(StepError::Recv(
                crate::error::RecvError::UnexpectedFrom { got: index },
            )))?;
        let last_ts = self.last_ts.get(&index).copied();
        envelope::receive(
            &frame.to_bytes(),
            &ReceiveContext {
                expected_msgno,
                expected_from: Origin::Peer(index),
                us: Destination::Tp,
                verifying_key: &vk,
                last_ts,
                now,
                ts_epsilon: self.params.ts_epsilon,
            },
        )
        .map_err(StepError::from)?;
        self.last_ts.insert(index, frame.header.ts);
        Ok(index)
    }

    fn broadcast(&self, msgno: u8, ts: u64, data: Vec<u8>) -> Frame {
        envelope::sign_and_frame(
            &self.signing_key,
            msgno,
            Origin::Tp,
            Destination::Broadcast,
            ts,
            self.session_id,
            data,
        )
    }

    fn step_bootstrap(&mut self, inbox: Vec<Frame>, now: u64) -> Result<Vec<Frame>, TpError> {
        for frame in &inbox {
            let index = self.verify_from_peer(frame, 0, now)?;
            let bootstrap: Bootstrap =
                messages::decode(&frame.data).map_err(|_| TpError::Step(StepError::OutOfOrder))?;
            self.bootstrapped.insert(index, bootstrap);
        }
        if self.bootstrapped.len() < self.params.n as usize {
            return Ok(Vec::new());
        }
        let entries = self
            .bootstrapped
            .iter()
            .map(|(&index, b)| PkTableEntry {
                index,
                ephemeral_vk: b.ephemeral_vk,
                noise_pub: b.noise_pub,
            })
            .collect();
        let table = PkTable { entries };
        let frame = self.broadcast(1, now, messages::encode(&table));
        self.step = TpStep::NoiseRelay { round: 0 };
        Ok(vec![frame])
    }

    /// Noise relay steps carry opaque handshake bytes the TP never parses;
    /// it only checks freshness/signature and forwards by recipient.
    fn step_noise_relay(&mut self, round: u8, inbox: Vec<Frame>) -> Result<Vec<Frame>, TpError> {
        let mut out = Vec::with_capacity(inbox.len());
        for frame in inbox {
            out.push(frame);
        }
        if round + 1 < NOISE_ROUNDS {
            self.step = TpStep::NoiseRelay { round: round + 1 };
        } else {
            self.step = TpStep::Commitments;
        }
        Ok(out)
    }

    fn step_commitments(&mut self, inbox: Vec<Frame>, now: u64) -> Result<Vec<Frame>, TpError> {
        for frame in &inbox {
            let index = self.verify_from_peer(frame, 5, now)?;
            let cv: messages::CommitmentVector =
                messages::decode(&frame.data).map_err(|_| TpError::Step(StepError::OutOfOrder))?;
            let points: Result<Vec<Point>, _> = cv
                .commitments
                .iter()
                .map(|b| toprf_core::group::Point::from_bytes(b))
                .collect();
            let points = points.map_err(toprf_core::Error::from)?;
            self.commitments.insert(index, points);
        }
        if self.commitments.len() < self.params.n as usize {
            return Ok(Vec::new());
        }
        let entries = self
            .commitments
            .iter()
            .map(|(&index, points)| (index, points.iter().map(|p| p.to_bytes()).collect()))
            .collect();
        let table = messages::CommitmentTable { entries };
        let frame = self.broadcast(6, now, messages::encode(&table));
        self.step = TpStep::ShareRelay;
        Ok(vec![frame])
    }

    fn step_share_relay(&mut self, inbox: Vec<Frame>) -> Result<Vec<Frame>, TpError> {
        let mut out = Vec::with_capacity(inbox.len());
        for frame in inbox {
            if let (Origin::Peer(from), Destination::Peer(to)) = (frame.header.from, frame.header.to)
            {
                self.relayed_shares.insert(
                    (from, to),
                    RelayedShare {
                        data: frame.data.clone(),
                    },
                );
            }
            out.push(frame);
        }
        let expected = self.params.n as usize * (self.params.n as usize - 1);
        if self.relayed_shares.len() >= expected {
            self.step = TpStep::Complaints;
        }
        Ok(out)
    }

    fn step_complaints(&mut self, inbox: Vec<Frame>, now: u64) -> Result<Vec<Frame>, TpError> {
        for frame in &inbox {
            let accuser = self.verify_from_peer(frame, 8, now)?;
            let complaint: messages::Complaint =
                messages::decode(&frame.data).map_err(|_| TpError::Step(StepError::OutOfOrder))?;
            self.complaints.push((accuser, complaint.accused));
        }
        let table = ComplaintTable {
            entries: self.complaints.clone(),
        };
        let announce = self.broadcast(9, now, messages::encode(&table));
        if self.complaints.is_empty() {
            self.step = TpStep::TranscriptCheck;
        } else {
            self.reveals_opened_at = Some(now);
            self.step = TpStep::Reveals;
        }
        Ok(vec![announce])
    }

    fn step_reveals(&mut self, inbox: Vec<Frame>, now: u64) -> Result<Vec<Frame>, TpError> {
        // Every peer sends its transcript digest (msgno 11) in the same
        // round as any reveal (msgno 10) it owes, regardless of which macro
        // step the TP itself is in, so both msgnos show up in this inbox.
        for frame in &inbox {
            match frame.header.msgno {
                10 => {
                    let revealer = self.verify_from_peer(frame, 10, now)?;
                    let reveal: messages::Reveal = messages::decode(&frame.data)
                        .map_err(|_| TpError::Step(StepError::OutOfOrder))?;
                    let pair = (revealer.min(reveal.with_peer), revealer.max(reveal.with_peer));
                    let requested = self
                        .complaints
                        .iter()
                        .any(|&(a, b)| (a.min(b), a.max(b)) == pair);
                    if !requested {
                        self.cheaters.push(Cheater {
                            step: 10,
                            error: StepError::UnrequestedReveal {
                                peer: PartyIndex(revealer),
                            }
                            .code(),
                            peer: PartyIndex(revealer),
                            other_peer: None,
                            invalid_index: None,
                        });
                        continue;
                    }
                    let key = SessionKey::from_raw_parts(reveal.aead_key, reveal.hmac_key);
                    self.reveals.insert(pair, (key, PartyIndex(revealer)));
                }
                11 => {
                    let index = self.verify_from_peer(frame, 11, now)?;
                    if frame.data.len() == 32 {
                        let mut digest = [0u8; 32];
                        digest.copy_from_slice(&frame.data);
                        self.digests.insert(index, digest);
                    }
                }
                _ => {}
            }
        }
        if self.all_complaints_resolved() || self.reveal_deadline_elapsed(now) {
            self.resolve_complaints()?;
            self.check_threshold()?;
            self.step = TpStep::TranscriptCheck;
        }
        Ok(Vec::new())
    }

    fn all_complaints_resolved(&self) -> bool {
        self.complaints.iter().all(|&(a, b)| {
            let pair = (a.min(b), a.max(b));
            self.reveals.contains_key(&pair)
        })
    }

    /// `true` once the reveal round has been open longer than
    /// `REVEAL_TIMEOUT_SECS` without every complaint getting a matching
    /// reveal — at which point an accused peer that never responds is
    /// disqualified rather than stalling the run forever.
    fn reveal_deadline_elapsed(&self, now: u64) -> bool {
        self.reveals_opened_at
            .is_some_and(|opened| now.saturating_sub(opened) >= REVEAL_TIMEOUT_SECS)
    }

    fn resolve_complaints(&mut self) -> Result<(), TpError> {
        for &(accuser, accused) in &self.complaints.clone() {
            let pair = (accuser.min(accused), accuser.max(accused));
            let Some((key, _)) = self.reveals.get(&pair) else {
                self.cheaters.push(Cheater {
                    step: 10,
                    error: StepError::MissingReveal {
                        peer: PartyIndex(accused),
                    }
                    .code(),
                    peer: PartyIndex(accused),
                    other_peer: Some(PartyIndex(accuser)),
                    invalid_index: None,
                });
                continue;
            };
            let (dealer, recipient) = (accused, accuser);
            let Some(relayed) = self.relayed_shares.get(&(dealer, recipient)) else {
                self.cheaters.push(Cheater {
                    step: 10,
                    error: StepError::BadShare {
                        peer: PartyIndex(accused),
                    }
                    .code(),
                    peer: PartyIndex(accused),
                    other_peer: Some(PartyIndex(accuser)),
                    invalid_index: Some(recipient),
                });
                continue;
            };
            let nonce = share_nonce(self.session_id, dealer, recipient);
            let verdict: Result<(), StepError> = match key.open(&nonce, &relayed.data) {
                Err(NoiseAeadError::Truncated | NoiseAeadError::BadTag) => Err(StepError::RevealedShareBadTag {
                    peer: PartyIndex(accused),
                }),
                Err(NoiseAeadError::BadCiphertext) => Err(StepError::RevealedShareBadCiphertext {
                    peer: PartyIndex(accused),
                }),
                Ok(plain) if plain.len() == 32 => {
                    let mut bytes = [0u8; 32];
                    bytes.copy_from_slice(&plain);
                    match toprf_core::group::Scalar::from_canonical_bytes(bytes) {
                        Some(share)
                            if self
                                .commitments
                                .get(&dealer)
                                .is_some_and(|c| feldman::verify(c, recipient, &share)) =>
                        {
                            Ok(())
                        }
                        _ => Err(StepError::InvalidShareIndex {
                            peer: PartyIndex(accused),
                        }),
                    }
                }
                Ok(_) => Err(StepError::InvalidShareIndex {
                    peer: PartyIndex(accused),
                }),
            };
            match verdict {
                Ok(()) => {
                    self.cheaters.push(Cheater {
                        step: 10,
                        error: StepError::FalseAccusation {
                            accuser: PartyIndex(accuser),
                            accused: PartyIndex(accused),
                        }
                        .code(),
                        peer: PartyIndex(accuser),
                        other_peer: Some(PartyIndex(accused)),
                        invalid_index: None,
                    });
                }
                Err(e) => {
                    self.cheaters.push(Cheater {
                        step: 10,
                        error: e.code(),
                        peer: PartyIndex(accused),
                        other_peer: Some(PartyIndex(accuser)),
                        invalid_index: Some(recipient),
                    });
                }
            }
        }
        Ok(())
    }

    fn step_transcript_check(
        &mut self,
        inbox: Vec<Frame>,
        now: u64,
    ) -> Result<Vec<Frame>, TpError> {
        for frame in &inbox {
            let index = self.verify_from_peer(frame, 11, now)?;
            if frame.data.len() != 32 {
                continue;
            }
            let mut digest = [0u8; 32];
            digest.copy_from_slice(&frame.data);
            self.digests.insert(index, digest);
        }
        let honest: Vec<u8> = self
            .bootstrapped
            .keys()
            .copied()
            .filter(|i| !self.cheaters.iter().any(|c| c.peer.0 == *i))
            .collect();
        if self.digests.len() < honest.len() {
            return Ok(Vec::new());
        }
        let reference = self.digests.get(&honest[0]).copied();
        if let Some(reference) = reference {
            for &i in &honest {
                if let Some(d) = self.digests.get(&i) {
                    if !subtle::ConstantTimeEq::ct_eq(d.as_slice(), reference.as_slice()).into() {
                        self.cheaters.push(Cheater {
                            step: 11,
                            error: StepError::TranscriptMismatch {
                                peer: PartyIndex(i),
                            }
                            .code(),
                            peer: PartyIndex(i),
                            other_peer: None,
                            invalid_index: None,
                        });
                    }
                }
            }
        }
        self.check_threshold()?;
        let commitments: Vec<Point> = self
            .commitments
            .iter()
            .filter(|(i, _)| !self.cheaters.iter().any(|c| c.peer.0 == **i))
            .map(|(_, c)| c[0])
            .collect();
        let public_key = commitments
            .into_iter()
            .fold(Point::identity(), |acc, c| acc.add(&c));
        let conclusion = Conclusion {
            public_key: Some(public_key.to_bytes()),
            cheaters: self.cheaters.clone(),
        };
        let frame = self.broadcast(12, now, messages::encode(&conclusion));
        self.step = TpStep::Done;
        Ok(vec![frame])
    }
}

/// Deterministic per-(dealer, recipient) nonce for the share-delivery AEAD,
/// derived from the session id so it never repeats across sessions or
/// pairs.
pub fn share_nonce(session_id: SessionId, dealer: u8, recipient: u8) -> [u8; 24] {
    let mut hasher = blake3::Hasher::new_derive_key("toprf-dkg-share-nonce-v1");
    hasher.update(&session_id.0);
    hasher.update(&[dealer, recipient]);
    let mut nonce = [0u8; 24];
    hasher.finalize_xof().fill(&mut nonce);
    nonce
}
