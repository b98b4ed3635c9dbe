//! Cloudsim Core
//!
//! Core records for the cloudsim action engine.
//!
//! This crate contains:
//! - Domain types: the persistent audit trail of action runs (deployments,
//!   their payload snapshots and their error log)

pub mod domain;
