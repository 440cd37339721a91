//! Decision pipeline for laboratory procurement recommendations.
//!
//! Candidate offers flow through retrieval, normalization, rule-based inference, weighted
//! scoring, and explanation; user decisions feed an adaptive weight model that shapes later runs.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
