#![deny(missing_docs)]
//! Trusted-party distributed key generation (TP-DKG) for a Shamir-shared
//! threshold OPRF key over Ristretto255.
//!
//! A relay (the trusted party, [`tp::TpState`]) mediates every message
//! between a fixed set of peers ([`peer::PeerState`]) without ever learning
//! the joint secret: each peer deals its own Shamir polynomial contribution,
//! delivers shares over a per-pair Noise-XK channel ([`noise`]) relayed
//! through the TP, and commits to its polynomial via Feldman commitments
//! ([`feldman`]) so recipients can verify what they receive. A signed,
//! append-only [`transcript::Transcript`] lets every peer detect if the TP
//! relayed inconsistent views, and a bounded complaint/reveal ladder
//! ([`error::StepError`]) identifies cheaters without aborting the whole run
//! whenever the honest set still meets the threshold.
//!
//! Both state machines are purely synchronous and caller-driven: `next`
//! takes whatever frames arrived since the last call and returns whatever
//! frames should be sent next. Neither type spawns threads or performs I/O;
//! the caller owns the transport loop.

pub mod config;
pub mod envelope;
pub mod error;
pub mod feldman;
pub mod messages;
pub mod noise;
pub mod peer;
pub mod tp;
pub mod transcript;

pub use config::DkgParams;
pub use error::{PeerError, StepError, TpError};
pub use peer::PeerState;
pub use tp::TpState;
