use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::{serialize, sha256_digest};
use data_encoding::HEXLOWER;
use log::debug;
use num_bigint::{BigInt, Sign};
use std::ops::ShlAssign;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

pub const DEFAULT_DIFFICULTY: u32 = 20;
pub const MAX_DIFFICULTY: u32 = 255;

const MAX_NONCE: i64 = i64::MAX;
const CANCEL_CHECK_INTERVAL: i64 = 1 << 12;
const PROGRESS_LOG_INTERVAL: i64 = 1 << 20;

/// The block fields the nonce search commits to, detached from the block.
#[derive(Debug, Clone)]
pub struct BlockHeaderView {
    pub height: i64,
    pub version: i64,
    pub timestamp: i64,
    pub pre_block_hash: [u8; 32],
    pub merkle_root: [u8; 32],
    pub transactions: Vec<Transaction>,
}

/// Shared flag that stops an in-flight nonce search.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ProofOfWork {
    header: BlockHeaderView,
    tx_bytes: Vec<u8>,
    target: BigInt,
    difficulty: u32,
}

impl ProofOfWork {
    pub fn new(header: BlockHeaderView, difficulty: u32) -> Result<ProofOfWork> {
        let target = target_for(difficulty)?;
        let tx_bytes = serialize(&header.transactions)?;
        Ok(ProofOfWork {
            header,
            tx_bytes,
            target,
            difficulty,
        })
    }

    /// Recompute a stored block's hash and check it against the target.
    pub fn validate(block: &Block, difficulty: u32) -> Result<bool> {
        let pow = ProofOfWork::new(block.header_view(), difficulty)?;
        let hash = sha256_digest(&pow.prepare_data(block.get_nonce()));
        Ok(hash == *block.get_hash() && pow.meets_target(&hash))
    }

    pub fn target(&self) -> &BigInt {
        &self.target
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    fn prepare_data(&self, nonce: i64) -> Vec<u8> {
        let mut data_bytes = Vec::with_capacity(8 * 4 + 32 + self.tx_bytes.len());
        data_bytes.extend(self.header.height.to_be_bytes());
        data_bytes.extend(self.header.version.to_be_bytes());
        data_bytes.extend(self.header.pre_block_hash);
        data_bytes.extend(self.header.timestamp.to_be_bytes());
        data_bytes.extend(nonce.to_be_bytes());
        data_bytes.extend(self.tx_bytes.as_slice());
        data_bytes
    }

    pub fn meets_target(&self, hash: &[u8]) -> bool {
        BigInt::from_bytes_be(Sign::Plus, hash) < self.target
    }

    /// Search nonces from zero until one meets the target.
    pub fn search_nonce(&self) -> Result<([u8; 32], i64)> {
        self.search_nonce_until(&CancelToken::new())?
            .ok_or_else(|| BlockchainError::Mining("Nonce space exhausted".to_string()))
    }

    /// Like `search_nonce`, but gives up with `None` once `cancel` is set.
    pub fn search_nonce_until(&self, cancel: &CancelToken) -> Result<Option<([u8; 32], i64)>> {
        debug!(
            "Searching nonce for block at height {} (difficulty {})",
            self.header.height, self.difficulty
        );
        let mut nonce = 0;
        while nonce < MAX_NONCE {
            if nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                debug!("Nonce search cancelled after {nonce} attempts");
                return Ok(None);
            }
            if nonce > 0 && nonce % PROGRESS_LOG_INTERVAL == 0 {
                debug!("Tried {nonce} nonces at height {}", self.header.height);
            }

            let hash = sha256_digest(&self.prepare_data(nonce));
            if self.meets_target(&hash) {
                debug!("Found nonce {nonce}: {}", HEXLOWER.encode(&hash));
                return Ok(Some((hash, nonce)));
            }
            nonce += 1;
        }
        Ok(None)
    }

    /// Run the search on a dedicated `pow-worker` thread and wait for it.
    pub fn run_on_worker(self, cancel: &CancelToken) -> Result<([u8; 32], i64)> {
        let worker_cancel = cancel.clone();
        let handle = thread::Builder::new()
            .name("pow-worker".to_string())
            .spawn(move || self.search_nonce_until(&worker_cancel))?;

        let found = handle
            .join()
            .map_err(|_| BlockchainError::Mining("Proof-of-work worker panicked".to_string()))??;
        found.ok_or_else(|| BlockchainError::Mining("Nonce search cancelled".to_string()))
    }
}

/// 2^(255 - difficulty).
pub fn target_for(difficulty: u32) -> Result<BigInt> {
    if difficulty == 0 || difficulty > MAX_DIFFICULTY {
        return Err(BlockchainError::Config(format!(
            "Difficulty must be between 1 and {MAX_DIFFICULTY}, got {difficulty}"
        )));
    }
    let mut target = BigInt::from(1);
    target.shl_assign(MAX_DIFFICULTY - difficulty);
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::KeyPair;

    fn header(transactions: Vec<Transaction>) -> BlockHeaderView {
        BlockHeaderView {
            height: 1,
            version: 0,
            timestamp: 1_700_000_000,
            pre_block_hash: [7u8; 32],
            merkle_root: [0u8; 32],
            transactions,
        }
    }

    fn coinbase(locked_time: i64) -> Transaction {
        let address = KeyPair::new().unwrap().get_address();
        Transaction::new_coinbase_tx_at(&address, locked_time).unwrap()
    }

    #[test]
    fn test_target_bounds() {
        assert!(target_for(0).is_err());
        assert!(target_for(256).is_err());
        assert_eq!(target_for(255).unwrap(), BigInt::from(1));
        assert!(target_for(9).unwrap() < target_for(8).unwrap());

        let mut expected = BigInt::from(1);
        expected.shl_assign(235u32);
        assert_eq!(target_for(DEFAULT_DIFFICULTY).unwrap(), expected);
    }

    #[test]
    fn test_found_hash_is_below_target() {
        let pow = ProofOfWork::new(header(vec![coinbase(1)]), 8).unwrap();
        let (hash, nonce) = pow.search_nonce().unwrap();
        assert!(nonce >= 0);
        assert!(BigInt::from_bytes_be(Sign::Plus, &hash) < *pow.target());
        assert!(hash[0] == 0 && hash[1] < 0x80);
        assert_eq!(sha256_digest(&pow.prepare_data(nonce)), hash);
    }

    #[test]
    fn test_prepare_data_layout() {
        let txs = vec![coinbase(1)];
        let tx_bytes = serialize(&txs).unwrap();
        let pow = ProofOfWork::new(header(txs), 8).unwrap();
        let data = pow.prepare_data(42);

        assert_eq!(&data[0..8], &1i64.to_be_bytes());
        assert_eq!(&data[8..16], &0i64.to_be_bytes());
        assert_eq!(&data[16..48], &[7u8; 32]);
        assert_eq!(&data[48..56], &1_700_000_000i64.to_be_bytes());
        assert_eq!(&data[56..64], &42i64.to_be_bytes());
        assert_eq!(&data[64..], tx_bytes.as_slice());
    }

    #[test]
    fn test_transaction_order_changes_preimage() {
        let (a, b) = (coinbase(1), coinbase(2));
        let forward = ProofOfWork::new(header(vec![a.clone(), b.clone()]), 8).unwrap();
        let reverse = ProofOfWork::new(header(vec![b, a]), 8).unwrap();
        assert_ne!(forward.prepare_data(0), reverse.prepare_data(0));
    }

    #[test]
    fn test_cancelled_search_returns_none() {
        let pow = ProofOfWork::new(header(vec![coinbase(1)]), 255).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(pow.search_nonce_until(&cancel).unwrap().is_none());

        let err = pow.run_on_worker(&cancel).unwrap_err();
        assert!(matches!(err, BlockchainError::Mining(_)));
    }

    #[test]
    fn test_worker_search_succeeds() {
        let pow = ProofOfWork::new(header(vec![coinbase(3)]), 8).unwrap();
        let target = pow.target().clone();
        let (hash, _) = pow.run_on_worker(&CancelToken::new()).unwrap();
        assert!(BigInt::from_bytes_be(Sign::Plus, &hash) < target);
    }
}
