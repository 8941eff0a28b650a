//! DataCloud user registry service library crate.
//!
//! # Purpose
//! Exposes the registry API surface, access control, configuration and
//! storage implementations for use by the binary and tests.
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod model;
pub mod store;
