use crate::core::{TXInput, TXOutput};
use crate::wallet::hash_pub_key;
use serde::{Deserialize, Serialize};

/// (txid, vout) pair naming the output an input consumes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub struct SpendRecord {
    txid: [u8; 32],
    vout: usize,
}

impl SpendRecord {
    pub fn new(txid: [u8; 32], vout: usize) -> SpendRecord {
        SpendRecord { txid, vout }
    }

    pub fn get_txid(&self) -> &[u8; 32] {
        &self.txid
    }

    pub fn get_vout(&self) -> usize {
        self.vout
    }
}

impl From<&TXInput> for SpendRecord {
    fn from(input: &TXInput) -> Self {
        SpendRecord::new(*input.get_txid(), input.get_vout())
    }
}

/// A spendable output together with the place it was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct UTXO {
    txid: [u8; 32],
    vout: usize,
    output: TXOutput,
}

impl UTXO {
    pub fn new(txid: [u8; 32], vout: usize, output: TXOutput) -> UTXO {
        UTXO { txid, vout, output }
    }

    pub fn get_txid(&self) -> &[u8; 32] {
        &self.txid
    }

    pub fn get_vout(&self) -> usize {
        self.vout
    }

    pub fn get_value(&self) -> u64 {
        self.output.get_value()
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.output.get_pub_key_hash()
    }

    pub fn get_output(&self) -> &TXOutput {
        &self.output
    }

    pub fn record(&self) -> SpendRecord {
        SpendRecord::new(self.txid, self.vout)
    }

    pub fn matches_record(&self, record: &SpendRecord) -> bool {
        self.txid == record.txid && self.vout == record.vout
    }

    /// True when `input` references this output and carries a public key
    /// that hashes to its lock.
    pub fn is_spent_by(&self, input: &TXInput) -> bool {
        self.txid == *input.get_txid()
            && self.vout == input.get_vout()
            && hash_pub_key(input.get_pub_key()) == self.output.get_pub_key_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BLOCK_REWARD;
    use crate::wallet::KeyPair;

    #[test]
    fn test_is_spent_by_checks_outpoint_and_lock() {
        let owner = KeyPair::new().unwrap();
        let stranger = KeyPair::new().unwrap();
        let output = TXOutput::new(BLOCK_REWARD, &owner.get_address()).unwrap();
        let utxo = UTXO::new([1u8; 32], 0, output);

        assert!(utxo.is_spent_by(&TXInput::new([1u8; 32], 0, owner.get_public_key())));
        assert!(!utxo.is_spent_by(&TXInput::new([1u8; 32], 1, owner.get_public_key())));
        assert!(!utxo.is_spent_by(&TXInput::new([2u8; 32], 0, owner.get_public_key())));
        assert!(!utxo.is_spent_by(&TXInput::new([1u8; 32], 0, stranger.get_public_key())));
    }

    #[test]
    fn test_record_matching() {
        let owner = KeyPair::new().unwrap();
        let output = TXOutput::new(10, &owner.get_address()).unwrap();
        let utxo = UTXO::new([3u8; 32], 2, output);
        assert!(utxo.matches_record(&utxo.record()));
        assert!(!utxo.matches_record(&SpendRecord::new([3u8; 32], 1)));
    }
}
