//! csvport engine: bulk CSV to SQL Server migration.
//!
//! Ingests arbitrary CSV files from a directory tree and lands them in a
//! SQL Server database, one destination table per file, with inferred
//! column types. A durable job model records progress, errors and
//! metrics so runs can be monitored, audited and reprocessed.
//!
//! The pipeline per file: discover → read header → sample and infer
//! types → derive identifiers → create table → stream rows → bulk load.
//! Everything durable flows through the [`jobs::JobRepository`]; callers
//! interact with the engine through [`service::MigrationService`].

pub mod config;
pub mod csv;
pub mod db;
pub mod discovery;
pub mod error;
pub mod identifiers;
pub mod inference;
pub mod jobs;
pub mod service;

pub use config::EngineConfig;
pub use error::{EngineError, FileFailure, Result};
pub use service::MigrationService;
