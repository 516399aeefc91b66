//! Core helpers shared by the simulation.
//!
//! Nothing in here touches the network or the clock.

pub mod rng;

pub use rng::{derive_session_seed, SessionRng};
