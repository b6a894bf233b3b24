//! Test utilities for throw-away chains

use crate::core::Blockchain;
use crate::error::{BlockchainError, Result};
use tempfile::TempDir;

/// Low enough that a nonce search takes a few hundred hashes.
pub const TEST_DIFFICULTY: u32 = 8;

/// Create a temporary directory for testing
pub fn create_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(|e| BlockchainError::Io(e.to_string()))
}

/// Open an empty chain in a fresh temporary directory. Keep the directory
/// alive for as long as the chain is used.
pub fn open_test_chain() -> (TempDir, Blockchain) {
    let temp_dir = create_temp_dir().expect("temporary directory");
    let chain = Blockchain::open_with_path(temp_dir.path().join("chain"), TEST_DIFFICULTY)
        .expect("open test chain");
    (temp_dir, chain)
}

/// A chain whose genesis pays 50 coins to `funded`, with a separate
/// `miner` address configured as the coinbase recipient.
pub struct FundedChain {
    pub dir: TempDir,
    pub chain: Blockchain,
    pub funded: String,
    pub miner: String,
}

pub fn create_funded_chain() -> Result<FundedChain> {
    let (dir, mut chain) = open_test_chain();
    let funded = chain.get_new_address()?;
    let miner = chain.get_new_address()?;
    chain.create_coinbase(&funded)?;
    chain.set_coinbase(&miner)?;
    Ok(FundedChain {
        dir,
        chain,
        funded,
        miner,
    })
}

/// Fresh wallet addresses on `chain`.
pub fn create_test_addresses(chain: &mut Blockchain, count: usize) -> Result<Vec<String>> {
    (0..count).map(|_| chain.get_new_address()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BLOCK_REWARD;

    #[test]
    fn test_open_test_chain_is_empty() {
        let (_dir, chain) = open_test_chain();
        assert!(!chain.is_initialized());
        assert_eq!(chain.get_difficulty(), TEST_DIFFICULTY);
    }

    #[test]
    fn test_funded_chain() {
        let fixture = create_funded_chain().unwrap();
        assert_eq!(fixture.chain.get_best_height(), Some(0));
        assert_eq!(fixture.chain.get_balance(&fixture.funded).unwrap(), BLOCK_REWARD);
        assert_eq!(fixture.chain.get_balance(&fixture.miner).unwrap(), 0);
        assert_eq!(fixture.chain.get_coinbase(), Some(fixture.miner.as_str()));
        assert!(fixture.dir.path().exists());
    }

    #[test]
    fn test_create_test_addresses_are_unique() {
        let (_dir, mut chain) = open_test_chain();
        let addresses = create_test_addresses(&mut chain, 5).unwrap();
        let mut sorted = addresses.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 5);
        assert_eq!(chain.list_addresses(), sorted);
    }
}
