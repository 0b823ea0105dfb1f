//! Operator-facing commands composed from the provisioner.

pub mod setup;
pub mod teardown;
