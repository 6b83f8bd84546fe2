//! Sophia core: the trading decision pipeline shared by live and simulated runs.
//!
//! - Domain types (bars, positions, account ledger, trades, symbol specs)
//! - Indicator library, precomputed once per run
//! - Strategies producing one signal per bar
//! - Risk manager sizing and gating signals into order intents
//! - Historical simulator and live driver over a common decision function
//! - Parameter sets with BLAKE3 fingerprints and a seeded RNG hierarchy

pub mod components;
pub mod domain;
pub mod engine;
pub mod indicators;
pub mod params;
pub mod risk;
pub mod rng;
pub mod strategy;
