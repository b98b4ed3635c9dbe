//! Core domain types
//!
//! These records are shared between the engine (which persists and mutates them)
//! and operator tooling (which reads them back).

pub mod data;
pub mod deployment;
pub mod error_log;
