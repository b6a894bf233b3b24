//! Core blockchain functionality
//!
//! This module contains the fundamental ledger components including
//! blocks, transactions, the merkle commitment, proof-of-work consensus,
//! and the chain orchestrator.

pub mod block;
pub mod blockchain;
pub mod merkle;
pub mod monetary;
pub mod proof_of_work;
pub mod transaction;
pub mod utxo;

pub use block::{Block, BLOCK_VERSION, GENESIS_VERSION, ZERO_HASH};
pub use blockchain::{Blockchain, BlockchainIterator, ChainCursor};
pub use merkle::{MerkleNode, MerkleTree};
pub use monetary::{format_amount, parse_amount, BLOCK_REWARD, UNITS_PER_COIN};
pub use proof_of_work::{
    target_for, BlockHeaderView, CancelToken, ProofOfWork, DEFAULT_DIFFICULTY, MAX_DIFFICULTY,
};
pub use transaction::{TXInput, TXOutput, Transaction};
pub use utxo::{SpendRecord, UTXO};
