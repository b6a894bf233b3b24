//! Data storage and persistence
//!
//! The persistent unspent-output ledger kept in its own sled tree next to
//! the block store and the key store.

pub mod utxo_set;

pub use utxo_set::{UTXOSet, UTXO_TREE};
