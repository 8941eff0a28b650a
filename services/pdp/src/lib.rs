//! Policy decision point library crate.
//!
//! # Purpose
//! Serves the DataCloud authorization rules over the OPA Data API so existing
//! OPA clients can query them unchanged.
//!
//! # Notes
//! The binary in `main.rs` only wires configuration and listeners; everything
//! routable lives here so tests can drive the router directly.
pub mod api;
pub mod app;
pub mod config;
