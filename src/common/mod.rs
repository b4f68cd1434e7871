//! Definitions shared by the simulation and the analyzer.

pub mod config;
pub mod scene;
pub mod types;
