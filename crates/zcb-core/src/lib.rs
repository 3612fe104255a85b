//! Core domain + application logic for the Zoom chat bridge.
//!
//! This crate is intentionally framework-agnostic. The chat platform (Telegram),
//! the Zoom REST API and persistence live behind ports (traits) implemented in
//! adapter crates.

pub mod auth;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod meeting;
pub mod oauth;
pub mod pending;
pub mod ports;
pub mod posts;
pub mod preferences;
pub mod provider;
pub mod recent;
pub mod store;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use errors::{Error, Result};
