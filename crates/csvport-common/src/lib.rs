//! Shared infrastructure for csvport components.
//!
//! Currently this crate only hosts the logging setup used by the engine
//! and the CLI. Components should initialize logging once at startup via
//! [`logging::init_logging`] and use the `tracing` macros everywhere;
//! `println!`/`eprintln!` are reserved for direct CLI output.

pub mod logging;
