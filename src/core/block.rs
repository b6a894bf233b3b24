use crate::core::{BlockHeaderView, CancelToken, MerkleTree, ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::{current_timestamp, deserialize, serialize};
use data_encoding::HEXLOWER;
use log::info;
use serde::{Deserialize, Serialize};

/// Previous-hash of the genesis block and end marker for backward traversal.
pub const ZERO_HASH: [u8; 32] = [0u8; 32];

pub const GENESIS_VERSION: i64 = 1;
pub const BLOCK_VERSION: i64 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    height: i64,                    // Position in the chain, genesis is 0
    version: i64,                   // Opaque tag I only feed into the proof-of-work
    pre_block_hash: [u8; 32],       // Link back to the block I build on
    hash: [u8; 32],                 // The proof-of-work hash that met the target
    merkle_root: [u8; 32],          // Commitment to every transaction below
    timestamp: i64,                 // Unix seconds when mining started
    nonce: i64,                     // The nonce that produced `hash`
    transactions: Vec<Transaction>, // Coinbase first when there is one
}

impl Block {
    /// Mine a successor of the block at `prev_height` / `prev_hash`.
    pub fn new_block(
        prev_height: i64,
        prev_hash: [u8; 32],
        transactions: &[Transaction],
        difficulty: u32,
        cancel: &CancelToken,
    ) -> Result<Block> {
        Self::mine(
            prev_height + 1,
            BLOCK_VERSION,
            prev_hash,
            transactions,
            difficulty,
            cancel,
        )
    }

    pub fn new_genesis_block(
        transactions: &[Transaction],
        difficulty: u32,
        cancel: &CancelToken,
    ) -> Result<Block> {
        Self::mine(
            0,
            GENESIS_VERSION,
            ZERO_HASH,
            transactions,
            difficulty,
            cancel,
        )
    }

    fn mine(
        height: i64,
        version: i64,
        pre_block_hash: [u8; 32],
        transactions: &[Transaction],
        difficulty: u32,
        cancel: &CancelToken,
    ) -> Result<Block> {
        let merkle_root = MerkleTree::compute_root(transactions)?.ok_or_else(|| {
            BlockchainError::InvalidBlock("Block must contain at least one transaction".to_string())
        })?;

        let mut block = Block {
            height,
            version,
            pre_block_hash,
            hash: ZERO_HASH,
            merkle_root,
            timestamp: current_timestamp()?,
            nonce: 0,
            transactions: transactions.to_vec(),
        };

        info!("Starting proof-of-work for block at height {height} with difficulty {difficulty}");
        let pow = ProofOfWork::new(block.header_view(), difficulty)?;
        let (hash, nonce) = pow.run_on_worker(cancel)?;
        block.hash = hash;
        block.nonce = nonce;
        info!(
            "Proof-of-work completed for block {} at height {height}",
            HEXLOWER.encode(&hash)
        );

        Ok(block)
    }

    /// Fields committed by the proof-of-work, copied out of the block.
    pub fn header_view(&self) -> BlockHeaderView {
        BlockHeaderView {
            height: self.height,
            version: self.version,
            timestamp: self.timestamp,
            pre_block_hash: self.pre_block_hash,
            merkle_root: self.merkle_root,
            transactions: self.transactions.clone(),
        }
    }

    // I recompute the root from the stored transactions and compare
    pub fn verify_merkle_root(&self) -> Result<bool> {
        Ok(MerkleTree::compute_root(&self.transactions)? == Some(self.merkle_root))
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0 && self.pre_block_hash == ZERO_HASH
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    // I use these getters so nothing outside can rewrite a mined block
    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_pre_block_hash(&self) -> &[u8; 32] {
        &self.pre_block_hash
    }

    pub fn get_hash(&self) -> &[u8; 32] {
        &self.hash
    }

    pub fn get_hash_hex(&self) -> String {
        HEXLOWER.encode(&self.hash)
    }

    pub fn get_merkle_root(&self) -> &[u8; 32] {
        &self.merkle_root
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_height(&self) -> i64 {
        self.height
    }

    pub fn get_version(&self) -> i64 {
        self.version
    }

    pub fn get_nonce(&self) -> i64 {
        self.nonce
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::KeyPair;

    const DIFFICULTY: u32 = 8;

    fn coinbase() -> Transaction {
        Transaction::new_coinbase_tx(&KeyPair::new().unwrap().get_address()).unwrap()
    }

    #[test]
    fn test_genesis_block_fields() {
        let genesis =
            Block::new_genesis_block(&[coinbase()], DIFFICULTY, &CancelToken::new()).unwrap();
        assert!(genesis.is_genesis());
        assert_eq!(genesis.get_height(), 0);
        assert_eq!(genesis.get_version(), GENESIS_VERSION);
        assert_eq!(*genesis.get_pre_block_hash(), ZERO_HASH);
        assert!(genesis.verify_merkle_root().unwrap());
        assert!(ProofOfWork::validate(&genesis, DIFFICULTY).unwrap());
    }

    #[test]
    fn test_successor_links_to_predecessor() {
        let cancel = CancelToken::new();
        let genesis = Block::new_genesis_block(&[coinbase()], DIFFICULTY, &cancel).unwrap();
        let next = Block::new_block(
            genesis.get_height(),
            *genesis.get_hash(),
            &[coinbase()],
            DIFFICULTY,
            &cancel,
        )
        .unwrap();

        assert_eq!(next.get_height(), 1);
        assert_eq!(next.get_version(), BLOCK_VERSION);
        assert_eq!(next.get_pre_block_hash(), genesis.get_hash());
        assert!(!next.is_genesis());
        assert!(ProofOfWork::validate(&next, DIFFICULTY).unwrap());
    }

    #[test]
    fn test_empty_block_rejected() {
        let result = Block::new_genesis_block(&[], DIFFICULTY, &CancelToken::new());
        assert!(matches!(result, Err(BlockchainError::InvalidBlock(_))));
    }

    #[test]
    fn test_serialize_round_trip() {
        let txs = [coinbase(), coinbase()];
        let block = Block::new_genesis_block(&txs, DIFFICULTY, &CancelToken::new()).unwrap();
        let bytes = block.serialize().unwrap();
        assert_eq!(Block::deserialize(&bytes).unwrap(), block);
    }

    #[test]
    fn test_tampering_breaks_validation() {
        let mut block =
            Block::new_genesis_block(&[coinbase()], DIFFICULTY, &CancelToken::new()).unwrap();
        block.nonce += 1;
        assert!(!ProofOfWork::validate(&block, DIFFICULTY).unwrap());

        block.nonce -= 1;
        block.transactions.push(coinbase());
        assert!(!block.verify_merkle_root().unwrap());
    }
}
