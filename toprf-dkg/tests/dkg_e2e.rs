//! End-to-end runs of the trusted-party DKG driven through the in-process
//! harness in `toprf-test`, covering the happy path and each cheating
//! scenario the protocol is meant to detect.

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use toprf_core::shamir::evaluate_poly;
use toprf_dkg::StepError;

fn seeded_rng(seed: u64) -> ChaCha20Rng {
    ChaCha20Rng::seed_from_u64(seed)
}

#[test]
fn happy_path_reconstructs_a_consistent_shared_key() {
    let mut rng = seeded_rng(1);
    let outcome = toprf_test::run(3, 2, 64, &mut rng, |_peers| {}).expect("run converges");

    assert!(outcome.cheaters.is_empty());
    assert_eq!(outcome.shares.len(), 3);
    let public_key = outcome.public_key.expect("run reaches a conclusion");

    // Any 2 of the 3 dealt shares must reconstruct the same joint secret,
    // whose public half is the conclusion's advertised key.
    let shares: Vec<toprf_core::shamir::Share> = outcome
        .shares
        .iter()
        .take(2)
        .map(|(&i, &value)| toprf_core::shamir::Share { index: i, value })
        .collect();
    let secret = toprf_core::shamir::combine_scalars(&shares).unwrap();
    assert_eq!(toprf_core::group::Point::mul_base(&secret), public_key);
}

#[test]
fn bad_share_is_caught_as_invalid_share_index() {
    let mut rng = seeded_rng(2);
    let outcome = toprf_test::run(3, 2, 64, &mut rng, |peers| {
        peers.get_mut(&1).unwrap().test_corrupt_share_to(2);
    })
    .expect("run converges even with a cheater removed");

    // The dealt share itself decrypts fine (tag and ciphertext both genuine)
    // but fails Feldman verification against peer 1's own commitments.
    assert!(outcome.cheaters.iter().any(|c| c.peer.0 == 1
        && c.error == StepError::InvalidShareIndex {
            peer: toprf_types::PartyIndex(1),
        }
        .code()));
}

#[test]
fn corrupted_tag_is_caught_at_the_aead_layer() {
    let mut rng = seeded_rng(20);
    let outcome = toprf_test::run(3, 2, 64, &mut rng, |peers| {
        peers
            .get_mut(&1)
            .unwrap()
            .test_corrupt_ciphertext_to(2, toprf_dkg::peer::CiphertextFault::BadTag);
    })
    .expect("run converges even with a cheater removed");

    assert!(outcome.cheaters.iter().any(|c| c.peer.0 == 1
        && c.error == StepError::RevealedShareBadTag {
            peer: toprf_types::PartyIndex(1),
        }
        .code()));
}

#[test]
fn corrupted_ciphertext_is_caught_after_a_valid_tag() {
    let mut rng = seeded_rng(21);
    let outcome = toprf_test::run(3, 2, 64, &mut rng, |peers| {
        peers
            .get_mut(&1)
            .unwrap()
            .test_corrupt_ciphertext_to(2, toprf_dkg::peer::CiphertextFault::BadCiphertext);
    })
    .expect("run converges even with a cheater removed");

    assert!(outcome.cheaters.iter().any(|c| c.peer.0 == 1
        && c.error == StepError::RevealedShareBadCiphertext {
            peer: toprf_types::PartyIndex(1),
        }
        .code()));
}

#[test]
fn a_silent_accused_peer_is_disqualified_after_the_reveal_deadline() {
    let mut rng = seeded_rng(22);
    // Peer 2 never responds to the reveal round at all; once the TP's reveal
    // deadline elapses it disqualifies peer 2 for the missing reveal instead
    // of stalling forever.
    let outcome = toprf_test::run_with_clock(3, 2, 128, &mut rng, |peers| {
        peers.get_mut(&1).unwrap().test_force_complaint(2);
        peers.get_mut(&2).unwrap().test_go_silent();
    }, |iteration| 1_700_000_000 + (iteration as u64) * 10)
    .expect("run still converges once the deadline disqualifies the silent peer");

    assert!(outcome.cheaters.iter().any(|c| c.peer.0 == 2
        && c.error == StepError::MissingReveal {
            peer: toprf_types::PartyIndex(2),
        }
        .code()));
}

#[test]
fn a_stale_message_is_rejected_once_the_clock_jumps_past_the_freshness_window() {
    let mut rng = seeded_rng(23);
    // Hold the clock still for the first round (letting the initial
    // broadcast land with a real timestamp), then jump it far enough ahead
    // on the very next round that the in-flight frame now reads as stale.
    let result = toprf_test::run_with_clock(3, 2, 64, &mut rng, |_peers| {}, |iteration| {
        if iteration == 0 {
            1_700_000_000
        } else {
            1_700_000_000 + 100_000
        }
    });

    let is_stale_rejection = |e: &StepError| {
        matches!(
            e,
            StepError::Recv(toprf_dkg::error::RecvError::StaleTimestamp)
        )
    };
    match result {
        Err(toprf_test::HarnessError::Tp(toprf_dkg::TpError::Step(ref e))) if is_stale_rejection(e) => {}
        Err(toprf_test::HarnessError::Peer { source: toprf_dkg::PeerError::Step(ref e), .. })
            if is_stale_rejection(e) => {}
        other => panic!("expected a stale-timestamp rejection, got {other:?}"),
    }
}

#[test]
fn false_accusation_is_caught_and_blamed_on_the_accuser() {
    let mut rng = seeded_rng(3);
    let outcome = toprf_test::run(3, 2, 64, &mut rng, |peers| {
        // Peer 1 accuses peer 2 even though peer 2 dealt peer 1 a perfectly
        // good share; once both reveal, the TP should find the share valid.
        peers.get_mut(&1).unwrap().test_force_complaint(2);
    })
    .expect("run converges");

    assert!(outcome.cheaters.iter().any(|c| c.peer.0 == 1
        && c.other_peer.map(|p| p.0) == Some(2)
        && c.error == StepError::FalseAccusation {
            accuser: toprf_types::PartyIndex(1),
            accused: toprf_types::PartyIndex(2),
        }
        .code()));
}

#[test]
fn unrequested_reveal_is_flagged_without_a_matching_complaint() {
    let mut rng = seeded_rng(4);
    let outcome = toprf_test::run(4, 2, 64, &mut rng, |peers| {
        // Keep the complaint machinery alive so the TP reaches its reveal
        // step at all, then have an uninvolved peer over-reveal.
        peers.get_mut(&1).unwrap().test_force_complaint(2);
        peers.get_mut(&3).unwrap().test_force_reveal(4);
    })
    .expect("run converges");

    assert!(outcome
        .cheaters
        .iter()
        .any(|c| c.peer.0 == 3 && c.error == StepError::UnrequestedReveal {
            peer: toprf_types::PartyIndex(3),
        }
        .code()));
}

#[test]
fn losing_too_many_peers_to_cheating_aborts_with_threshold_lost() {
    let mut rng = seeded_rng(5);
    // n=5, t=4: removing peers 1 and 2 as cheaters drops the honest count
    // to 3, below the threshold of 4.
    let result = toprf_test::run(5, 4, 64, &mut rng, |peers| {
        peers.get_mut(&1).unwrap().test_corrupt_share_to(3);
        peers.get_mut(&2).unwrap().test_corrupt_share_to(3);
    });

    match result {
        Err(toprf_test::HarnessError::Tp(toprf_dkg::TpError::Step(StepError::ThresholdLost {
            threshold,
            ..
        }))) => assert_eq!(threshold, 4),
        Err(toprf_test::HarnessError::Peer {
            source: toprf_dkg::PeerError::Step(StepError::ThresholdLost { threshold, .. }),
            ..
        }) => assert_eq!(threshold, 4),
        other => panic!("expected a threshold-lost failure, got {other:?}"),
    }
}

#[test]
fn evaluate_poly_matches_each_peers_dealt_share() {
    // Sanity check the harness's own reconstruction helper against the
    // core polynomial evaluator directly, independent of the DKG run.
    let coeffs = vec![
        toprf_core::group::Scalar::from_u64(7),
        toprf_core::group::Scalar::from_u64(3),
    ];
    let at_one = evaluate_poly(&coeffs, toprf_core::group::Scalar::from_u64(1));
    let at_two = evaluate_poly(&coeffs, toprf_core::group::Scalar::from_u64(2));
    assert_ne!(at_one, at_two);
}
