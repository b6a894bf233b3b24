//! Configuration management
//!
//! Database location, proof-of-work difficulty and log level, layered from
//! built-in defaults, an optional `ledger.toml`, and `LEDGER_*` environment
//! variables.

pub mod settings;

pub use settings::{Config, Settings, GLOBAL_CONFIG};
