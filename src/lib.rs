//! ODDSMITH — Race Prediction Fusion & Bet Selection Engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod fusion;
pub mod model;
pub mod strategy;
pub mod engine;
