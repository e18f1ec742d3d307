//! logsentry library.
//!
//! Exposes internal modules for integration testing.
//! The binary entry point is in `main.rs`.

pub mod app;
pub mod cli;
pub mod error;
pub mod logging;
pub mod notifier;
