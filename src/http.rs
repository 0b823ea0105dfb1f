//! Blocking HTTP transport and its configuration.

pub mod client;
pub mod config;
