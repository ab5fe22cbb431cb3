//! Trellis - Rules-based task routing and delegation engine
//!
//! This library scores tasks against a rule table to pick a destination,
//! hands custody across a destination hierarchy through an auditable
//! delegation protocol, and keeps recent routing context in a bounded
//! working-memory cache.

pub mod config;
pub mod delegation;
pub mod engine;
pub mod hierarchy;
pub mod logging;
pub mod memory;
pub mod scoring;
pub mod task;
