//! Provisions a narrowly scoped AWS IAM user and publishes its credentials as encrypted GitHub
//! Actions repository secrets, and tears both down again.
//!
//! Every step of [provisioner::Provisioner] is idempotent: it probes the remote state first and
//! only acts on what is missing or different, so an interrupted run is resumed by running it again.

pub mod commands;
pub mod config;
pub mod error;
pub mod github;
pub mod http;
pub mod http_client;
pub mod iam;
pub mod key_cache;
pub mod parameters;
pub mod provisioner;
pub mod reconcile;
pub mod sealer;
