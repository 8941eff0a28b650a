//! PDP HTTP API module.
//!
//! # Purpose
//! Exposes the OPA-compatible Data API handlers and the health probe.
pub mod data;
pub mod error;
pub mod health;
pub mod types;
