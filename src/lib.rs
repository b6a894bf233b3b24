//! # Ledger Chain
//!
//! A single-node proof-of-work ledger with a UTXO model.
//!
//! ## Layout
//! - `core/`: blocks, transactions, merkle commitment, proof-of-work and the
//!   `Blockchain` orchestrator
//! - `storage/`: the persistent address → unspent-output ledger
//! - `wallet/`: address codec, P-256 key pairs and the persisted wallet
//! - `utils/`: hashing, signing, base58 and the wire codec
//! - `config/`: layered settings (defaults, `ledger.toml`, `LEDGER_*`)
//! - `cli/`: argument parsing for the binary
//!
//! Blocks, UTXOs and keys share one sled database. Every operation that
//! writes to more than one of them commits atomically.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

pub use cli::{AmountArg, Command, Opt};
pub use config::{Config, Settings, GLOBAL_CONFIG};
pub use core::{
    format_amount, parse_amount, Block, Blockchain, BlockchainIterator, CancelToken, ChainCursor,
    MerkleTree, ProofOfWork, SpendRecord, TXInput, TXOutput, Transaction, BLOCK_REWARD,
    UNITS_PER_COIN, UTXO,
};
pub use error::{BlockchainError, Result};
pub use storage::UTXOSet;
pub use utils::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, new_key_pair, ripemd160_digest, sha256_digest,
};
pub use wallet::{
    address_from_pub_key_hash, hash_pub_key, is_address_valid, new_address, KeyPair, Wallet,
    ADDRESS_CHECK_SUM_LEN,
};
