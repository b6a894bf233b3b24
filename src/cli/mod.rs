//! Command-line interface
//!
//! Argument parsing for the `ledger-chain` binary. The binary maps each
//! subcommand onto one `Blockchain` operation.

pub mod commands;

pub use commands::{AmountArg, Command, Opt};
