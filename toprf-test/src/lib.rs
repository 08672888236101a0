#![deny(missing_docs)]
//! An in-process harness that wires a [`toprf_dkg::TpState`] and a set of
//! [`toprf_dkg::PeerState`]s together and drives them to completion,
//! simulating the TP as the sole relay between peers the way a real
//! deployment's transport loop would. Used by `toprf-dkg`'s integration
//! tests to exercise full runs, including cheating scenarios, without any
//! actual network I/O.

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use std::collections::BTreeMap;
use toprf_dkg::{DkgParams, PeerState, TpState};
use toprf_types::wire::{Destination, Frame};
use toprf_types::{PartyIndex, SessionId};

/// Errors raised driving a harness run.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// The TP state machine returned an error.
    #[error(transparent)]
    Tp(#[from] toprf_dkg::TpError),
    /// A peer state machine returned an error.
    #[error("peer {peer}: {source}")]
    Peer {
        /// The peer that errored.
        peer: u8,
        /// The underlying error.
        #[source]
        source: toprf_dkg::PeerError,
    },
    /// The run did not converge within the iteration budget.
    #[error("run did not converge within {0} iterations")]
    NotConverged(usize),
}

/// The outcome of a completed (or aborted) harness run.
pub struct RunOutcome {
    /// Every peer's reconstructed final share, keyed by index, for peers
    /// that were not removed as cheaters.
    pub shares: BTreeMap<u8, toprf_core::group::Scalar>,
    /// The joint public key every surviving peer agreed on, if the run
    /// reached a conclusion.
    pub public_key: Option<toprf_core::group::Point>,
    /// Every cheater identified during the run, as seen by the TP.
    pub cheaters: Vec<toprf_types::Cheater>,
}

/// Drive a fresh `n`-party, `t`-threshold DKG run to completion (or up to
/// `max_iterations` harness loops, whichever comes first).
pub fn run_happy_path(n: u8, t: u8, max_iterations: usize) -> Result<RunOutcome, HarnessError> {
    let mut rng = OsRng;
    run(n, t, max_iterations, &mut rng, |_peers| {})
}

/// Drive a run like [`run_happy_path`], but let `tamper` mutate the peer
/// set after construction (e.g. corrupt a peer's dealt polynomial) before
/// the run starts, to exercise cheating scenarios.
///
/// Each harness loop advances the clock by one second, so every sender's
/// timestamps are strictly increasing round over round, the way a real
/// transport loop's wall clock would behave.
pub fn run<R: RngCore + CryptoRng>(
    n: u8,
    t: u8,
    max_iterations: usize,
    rng: &mut R,
    tamper: impl FnOnce(&mut BTreeMap<u8, PeerState>),
) -> Result<RunOutcome, HarnessError> {
    run_with_clock(n, t, max_iterations, rng, tamper, |iteration| {
        1_700_000_000 + iteration as u64
    })
}

/// Drive a run like [`run`], but let `clock` compute each harness loop's
/// `now` from the iteration number, instead of the default one-second
/// step. Lets a test simulate a processing delay large enough to make an
/// already-signed, in-flight message's timestamp go stale relative to the
/// receiver's clock.
pub fn run_with_clock<R: RngCore + CryptoRng>(
    n: u8,
    t: u8,
    max_iterations: usize,
    rng: &mut R,
    tamper: impl FnOnce(&mut BTreeMap<u8, PeerState>),
    mut clock: impl FnMut(usize) -> u64,
) -> Result<RunOutcome, HarnessError> {
    let params = DkgParams::new(n, t, 3600).expect("valid test params");
    let session_id = SessionId::random(rng);
    let tp_signing_key = SigningKey::generate(rng);
    let tp_verifying_key = tp_signing_key.verifying_key();

    let long_term_keys: BTreeMap<u8, SigningKey> =
        (1..=n).map(|i| (i, SigningKey::generate(rng))).collect();
    let verifying_keys: BTreeMap<u8, ed25519_dalek::VerifyingKey> = long_term_keys
        .iter()
        .map(|(&i, k)| (i, k.verifying_key()))
        .collect();

    let mut tp = TpState::start(params, session_id, tp_signing_key, verifying_keys)?;
    let mut peers: BTreeMap<u8, PeerState> = long_term_keys
        .into_iter()
        .map(|(i, key)| {
            let peer = PeerState::start(
                PartyIndex(i),
                params,
                session_id,
                key,
                tp_verifying_key,
                rng,
            )
            .map_err(|e| HarnessError::Peer { peer: i, source: e })?;
            Ok((i, peer))
        })
        .collect::<Result<_, HarnessError>>()?;

    tamper(&mut peers);

    let mut tp_inbox: Vec<Frame> = Vec::new();
    let mut peer_inboxes: BTreeMap<u8, Vec<Frame>> = (1..=n).map(|i| (i, Vec::new())).collect();

    for iteration in 0..max_iterations {
        let now = clock(iteration);
        let tp_out = tp.next(std::mem::take(&mut tp_inbox), now)?;
        for frame in tp_out {
            deliver_from_tp(frame, &mut peer_inboxes);
        }

        for (&index, peer) in peers.iter_mut() {
            let inbox = peer_inboxes.get_mut(&index).map(std::mem::take).unwrap_or_default();
            let out = peer
                .next(inbox, now)
                .map_err(|e| HarnessError::Peer { peer: index, source: e })?;
            tp_inbox.extend(out);
        }

        // A peer the TP has already disqualified (e.g. one that never
        // revealed) may never advance its own state machine past the round
        // it went silent in; count it as done anyway so a disqualified peer
        // can't stall convergence.
        let all_peers_done = peers
            .iter()
            .all(|(i, p)| !p.not_done() || tp.cheaters().iter().any(|c| c.peer.0 == *i));
        if !tp.not_done() && all_peers_done {
            let shares = peers
                .iter()
                .filter_map(|(&i, p)| p.final_share().map(|s| (i, *s)))
                .collect();
            let public_key = peers.values().find_map(|p| p.public_key().copied());
            return Ok(RunOutcome {
                shares,
                public_key,
                cheaters: tp.cheaters().to_vec(),
            });
        }
    }
    Err(HarnessError::NotConverged(max_iterations))
}

fn deliver_from_tp(frame: Frame, peer_inboxes: &mut BTreeMap<u8, Vec<Frame>>) {
    match frame.header.to {
        Destination::Broadcast => {
            for inbox in peer_inboxes.values_mut() {
                inbox.push(frame.clone());
            }
        }
        Destination::Peer(i) => {
            if let Some(inbox) = peer_inboxes.get_mut(&i) {
                inbox.push(frame);
            }
        }
        Destination::Tp => {}
    }
}
