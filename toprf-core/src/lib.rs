#![deny(missing_docs)]
//! Core cryptographic primitives for a threshold oblivious pseudorandom
//! function (TOPRF) over Ristretto255.
//!
//! This crate provides the "hard core" math described by the wider
//! threshold-OPRF system: a thin [`group`] adapter over Ristretto255,
//! [`shamir`] secret sharing with Lagrange interpolation, the non-threshold
//! [`oprf`] primitive it generalizes, and the [`toprf`] evaluate/combine
//! functions used by each shareholder and the client respectively.
//!
//! Orchestrating a group of mutually distrusting shareholders into a Shamir
//! sharing of a fresh secret — the trusted-party distributed key generation
//! protocol — lives in the sibling `toprf-dkg` crate, which depends on this
//! one for its math.

pub mod error;
pub mod group;
pub mod oprf;
pub mod shamir;
pub mod toprf;

pub use error::Error;
pub use group::{Point, Scalar};
pub use shamir::Share;
pub use toprf::PartialEval;
