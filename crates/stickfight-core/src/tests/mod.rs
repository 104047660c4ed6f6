//! Cross-module tests for the session engine.
//!
//! - `integration.rs`: host and guest playing full sessions over a store
//! - `determinism.rs`: identical seeds give identical matches
//! - `properties.rs`: property tests over random matches and deliveries
//! - `helpers.rs`: scripted random sources and session setup

mod helpers;
mod integration;

pub use helpers::*;
