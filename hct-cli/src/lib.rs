//! HCT CLI library.
//!
//! This library exposes the command handlers for integration testing.
//! In production, `hct` is used as a binary (main.rs).

pub mod cli;
pub mod commands;
pub mod error;
pub mod host;
pub mod logging;
pub mod metrics;
pub mod output;
