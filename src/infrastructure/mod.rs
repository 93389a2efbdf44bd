//! Infrastructure layer module
//!
//! Adapters that satisfy the domain ports and talk to the outside world:
//! - Configuration loading (figment)
//! - Logging setup (tracing)
//! - The Claude CLI generation engine and test file writer
//! - Git change detection
//! - The heuristic project scanner
//! - The atomic JSON state store

pub mod config;
pub mod engine;
pub mod logging;
pub mod scanner;
pub mod store;
pub mod vcs;
