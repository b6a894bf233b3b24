// Value transfers in the UTXO model. Each input names an earlier output by
// (txid, vout) and proves ownership with a per-input signature; each output
// locks an amount to a versioned public key hash.

use crate::core::{BLOCK_REWARD, UTXO};
use crate::error::{BlockchainError, Result};
use crate::utils::{
    current_timestamp, deserialize, ecdsa_p256_sha256_sign_verify, restore_signature, serialize,
    sha256_digest,
};
use crate::wallet::{hash_pub_key, lock_hash_from_address, KeyPair};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TXInput {
    txid: [u8; 32],     // The transaction holding the output I spend
    vout: usize,        // Index of that output
    signature: Vec<u8>, // 64-byte r||s proving I own the output
    // Raw public key of the spender. Replaced by the claimed output's lock
    // hash only inside sighash copies.
    pub_key: Vec<u8>,
}

impl TXInput {
    pub fn new(txid: [u8; 32], vout: usize, pub_key: &[u8]) -> TXInput {
        TXInput {
            txid,
            vout,
            signature: vec![],
            pub_key: pub_key.to_vec(),
        }
    }

    pub fn get_txid(&self) -> &[u8; 32] {
        &self.txid
    }

    pub fn get_vout(&self) -> usize {
        self.vout
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }

    // I use this to tell which inputs a given address signed
    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        hash_pub_key(self.pub_key.as_slice()) == pub_key_hash
    }
}

#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TXOutput {
    value: u64,            // Amount in minor units, never zero
    pub_key_hash: Vec<u8>, // Version byte + RIPEMD160(SHA256(pubkey)) of the owner
}

impl TXOutput {
    pub fn new(value: u64, address: &str) -> Result<TXOutput> {
        if value == 0 {
            return Err(BlockchainError::Transaction(
                "Output value must be positive".to_string(),
            ));
        }

        Ok(TXOutput {
            value,
            pub_key_hash: lock_hash_from_address(address)?,
        })
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash == pub_key_hash
    }

    pub fn is_locked_to(&self, address: &str) -> bool {
        match lock_hash_from_address(address) {
            Ok(lock_hash) => self.is_locked_with_key(&lock_hash),
            Err(_) => false,
        }
    }
}

#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    hash: [u8; 32],      // Content hash, computed once before signing
    vin: Vec<TXInput>,   // Outputs I consume (empty for a coinbase)
    vout: Vec<TXOutput>, // Outputs I create
    // Unix seconds; keeps otherwise identical transactions distinct.
    locked_time: i64,
}

impl Transaction {
    /// Reward transaction paying `BLOCK_REWARD` to `address`.
    pub fn new_coinbase_tx(address: &str) -> Result<Transaction> {
        Self::new_coinbase_tx_at(address, current_timestamp()?)
    }

    pub fn new_coinbase_tx_at(address: &str, locked_time: i64) -> Result<Transaction> {
        let mut tx = Transaction {
            hash: [0u8; 32],
            vin: vec![],
            vout: vec![TXOutput::new(BLOCK_REWARD, address)?],
            locked_time,
        };
        tx.hash = tx.content_hash()?;
        Ok(tx)
    }

    /// Build an unsigned transfer spending every UTXO in `spend_utxos`.
    ///
    /// The caller selects the UTXOs; any value above `amount` comes back to
    /// `from` as a change output.
    pub fn new_transaction(
        spend_utxos: &[UTXO],
        from: &str,
        from_pub_key: &[u8],
        to: &str,
        amount: u64,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(BlockchainError::Validation(
                "Amount must be positive".to_string(),
            ));
        }

        let mut input_amount = 0u64;
        let mut inputs = Vec::with_capacity(spend_utxos.len());
        for utxo in spend_utxos {
            input_amount = input_amount
                .checked_add(utxo.get_value())
                .ok_or_else(|| BlockchainError::Transaction("Input value overflow".to_string()))?;
            inputs.push(TXInput::new(*utxo.get_txid(), utxo.get_vout(), from_pub_key));
        }

        if input_amount < amount {
            return Err(BlockchainError::InsufficientFunds {
                required: amount,
                available: input_amount,
            });
        }

        let mut outputs = vec![TXOutput::new(amount, to)?];
        let change = input_amount - amount;
        if change > 0 {
            outputs.push(TXOutput::new(change, from)?);
        }

        let mut tx = Transaction {
            hash: [0u8; 32],
            vin: inputs,
            vout: outputs,
            locked_time: current_timestamp()?,
        };
        tx.hash = tx.content_hash()?;
        Ok(tx)
    }

    /// sha256 of the serialized transaction with the hash field zeroed.
    pub fn content_hash(&self) -> Result<[u8; 32]> {
        let tx_copy = Transaction {
            hash: [0u8; 32],
            vin: self.vin.clone(),
            vout: self.vout.clone(),
            locked_time: self.locked_time,
        };
        Ok(sha256_digest(&tx_copy.serialize()?))
    }

    /// Digest signed by input `input_index`: every signature and key field is
    /// emptied, then the indexed input's key field holds the lock hash of
    /// the output it claims.
    pub fn compute_sighash(
        &self,
        input_index: usize,
        replacement_lock_hash: &[u8],
    ) -> Result<[u8; 32]> {
        if input_index >= self.vin.len() {
            return Err(BlockchainError::Integrity(format!(
                "Input index {input_index} out of range ({} inputs)",
                self.vin.len()
            )));
        }

        let mut tx_copy = self.trimmed_copy();
        tx_copy.vin[input_index].pub_key = replacement_lock_hash.to_vec();
        tx_copy.content_hash()
    }

    fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .vin
            .iter()
            .map(|input| TXInput {
                txid: input.txid,
                vout: input.vout,
                signature: vec![],
                pub_key: vec![],
            })
            .collect();
        Transaction {
            hash: self.hash,
            vin: inputs,
            vout: self.vout.clone(),
            locked_time: self.locked_time,
        }
    }

    /// Sign every input against the UTXO it spends. `utxos[i]` must be the
    /// output claimed by input `i`.
    pub fn sign(&mut self, key_pair: &KeyPair, utxos: &[UTXO]) -> Result<()> {
        if self.vin.len() != utxos.len() {
            return Err(BlockchainError::Integrity(format!(
                "Cannot sign {} inputs with {} UTXOs",
                self.vin.len(),
                utxos.len()
            )));
        }

        let signatures = utxos
            .iter()
            .enumerate()
            .map(|(idx, utxo)| {
                let sighash = self.compute_sighash(idx, utxo.get_pub_key_hash())?;
                key_pair.sign(&sighash)
            })
            .collect::<Result<Vec<_>>>()?;

        for (input, signature) in self.vin.iter_mut().zip(signatures) {
            input.signature = signature.to_bytes();
        }
        Ok(())
    }

    /// Check every input signature against the UTXOs it claims. Coinbase
    /// transactions always pass. The first failing input rejects the whole
    /// transaction.
    pub fn verify_sign(&self, utxos: &[UTXO]) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        // Only a coinbase may mint value.
        if self.vin.is_empty() {
            return Err(BlockchainError::Integrity(format!(
                "Transaction {} spends nothing but is not a coinbase",
                HEXLOWER.encode(&self.hash)
            )));
        }
        if self.vin.len() != utxos.len() {
            return Err(BlockchainError::Integrity(format!(
                "Transaction {} has {} inputs but {} UTXOs were supplied",
                HEXLOWER.encode(&self.hash),
                self.vin.len(),
                utxos.len()
            )));
        }

        let input_value = utxos.iter().try_fold(0u64, |total, utxo| {
            total
                .checked_add(utxo.get_value())
                .ok_or_else(|| BlockchainError::Transaction("Input value overflow".to_string()))
        })?;
        let output_value = self.get_output_value()?;
        if output_value > input_value {
            return Err(BlockchainError::Integrity(format!(
                "Transaction {} pays out {output_value} from inputs worth {input_value}",
                HEXLOWER.encode(&self.hash)
            )));
        }

        for (idx, (input, utxo)) in self.vin.iter().zip(utxos).enumerate() {
            if !utxo.is_spent_by(input) {
                return Err(BlockchainError::Signature(format!(
                    "Input {idx} of {} does not own the UTXO it claims",
                    HEXLOWER.encode(&self.hash)
                )));
            }

            let sighash = self.compute_sighash(idx, utxo.get_pub_key_hash())?;
            let signature = restore_signature(input.get_signature())?;
            if !ecdsa_p256_sha256_sign_verify(input.get_pub_key(), &sighash, &signature) {
                return Err(BlockchainError::Signature(format!(
                    "Signature verification failed for input {idx} of {}",
                    HEXLOWER.encode(&self.hash)
                )));
            }
        }
        Ok(())
    }

    // A coinbase spends nothing and pays exactly one output
    pub fn is_coinbase(&self) -> bool {
        self.vin.is_empty() && self.vout.len() == 1
    }

    pub fn get_hash(&self) -> &[u8; 32] {
        &self.hash
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn get_locked_time(&self) -> i64 {
        self.locked_time
    }

    pub fn get_output_value(&self) -> Result<u64> {
        self.vout.iter().try_fold(0u64, |total, out| {
            total
                .checked_add(out.get_value())
                .ok_or_else(|| BlockchainError::Transaction("Output value overflow".to_string()))
        })
    }

    /// Outputs of this transaction as UTXOs.
    pub fn utxos(&self) -> Vec<UTXO> {
        self.vout
            .iter()
            .enumerate()
            .map(|(idx, out)| UTXO::new(self.hash, idx, out.clone()))
            .collect()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::UNITS_PER_COIN;

    fn funded(owner: &KeyPair) -> (Transaction, Vec<UTXO>) {
        let coinbase = Transaction::new_coinbase_tx(&owner.get_address()).unwrap();
        let utxos = coinbase.utxos();
        (coinbase, utxos)
    }

    #[test]
    fn test_coinbase_shape() {
        let owner = KeyPair::new().unwrap();
        let (coinbase, utxos) = funded(&owner);
        assert!(coinbase.is_coinbase());
        assert!(coinbase.get_vin().is_empty());
        assert_eq!(coinbase.get_vout().len(), 1);
        assert_eq!(utxos[0].get_value(), BLOCK_REWARD);
        assert!(coinbase.get_vout()[0].is_locked_to(&owner.get_address()));
        assert_eq!(*coinbase.get_hash(), coinbase.content_hash().unwrap());
        assert!(coinbase.verify_sign(&[]).is_ok());
    }

    #[test]
    fn test_new_transaction_with_change() {
        let alice = KeyPair::new().unwrap();
        let bob = KeyPair::new().unwrap();
        let (_, utxos) = funded(&alice);

        let tx = Transaction::new_transaction(
            &utxos,
            &alice.get_address(),
            alice.get_public_key(),
            &bob.get_address(),
            30 * UNITS_PER_COIN,
        )
        .unwrap();

        assert!(!tx.is_coinbase());
        assert_eq!(tx.get_vin().len(), 1);
        assert_eq!(tx.get_vout().len(), 2);
        assert!(tx.get_vout()[0].is_locked_to(&bob.get_address()));
        assert_eq!(tx.get_vout()[0].get_value(), 30 * UNITS_PER_COIN);
        assert!(tx.get_vout()[1].is_locked_to(&alice.get_address()));
        assert_eq!(tx.get_vout()[1].get_value(), 20 * UNITS_PER_COIN);
    }

    #[test]
    fn test_exact_amount_has_no_change() {
        let alice = KeyPair::new().unwrap();
        let bob = KeyPair::new().unwrap();
        let (_, utxos) = funded(&alice);
        let tx = Transaction::new_transaction(
            &utxos,
            &alice.get_address(),
            alice.get_public_key(),
            &bob.get_address(),
            BLOCK_REWARD,
        )
        .unwrap();
        assert_eq!(tx.get_vout().len(), 1);
    }

    #[test]
    fn test_new_transaction_rejects_overspend() {
        let alice = KeyPair::new().unwrap();
        let bob = KeyPair::new().unwrap();
        let (_, utxos) = funded(&alice);
        let result = Transaction::new_transaction(
            &utxos,
            &alice.get_address(),
            alice.get_public_key(),
            &bob.get_address(),
            BLOCK_REWARD + 1,
        );
        assert!(matches!(
            result,
            Err(BlockchainError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_sign_keeps_hash_and_verifies() {
        let alice = KeyPair::new().unwrap();
        let bob = KeyPair::new().unwrap();
        let (_, utxos) = funded(&alice);
        let mut tx = Transaction::new_transaction(
            &utxos,
            &alice.get_address(),
            alice.get_public_key(),
            &bob.get_address(),
            UNITS_PER_COIN,
        )
        .unwrap();

        let hash_before = *tx.get_hash();
        tx.sign(&alice, &utxos).unwrap();
        assert_eq!(*tx.get_hash(), hash_before);
        assert!(tx.get_vin().iter().all(|input| !input.get_signature().is_empty()));
        assert!(tx.verify_sign(&utxos).is_ok());
    }

    #[test]
    fn test_verify_rejects_foreign_signer() {
        let alice = KeyPair::new().unwrap();
        let mallory = KeyPair::new().unwrap();
        let (_, utxos) = funded(&alice);
        let mut tx = Transaction::new_transaction(
            &utxos,
            &alice.get_address(),
            alice.get_public_key(),
            &mallory.get_address(),
            UNITS_PER_COIN,
        )
        .unwrap();

        tx.sign(&mallory, &utxos).unwrap();
        assert!(matches!(
            tx.verify_sign(&utxos),
            Err(BlockchainError::Signature(_))
        ));
    }

    #[test]
    fn test_verify_rejects_tampered_output() {
        let alice = KeyPair::new().unwrap();
        let bob = KeyPair::new().unwrap();
        let (_, utxos) = funded(&alice);
        let mut tx = Transaction::new_transaction(
            &utxos,
            &alice.get_address(),
            alice.get_public_key(),
            &bob.get_address(),
            UNITS_PER_COIN,
        )
        .unwrap();
        tx.sign(&alice, &utxos).unwrap();

        tx.vout[0].value += 1;
        assert!(tx.verify_sign(&utxos).is_err());
    }

    #[test]
    fn test_utxo_count_mismatch() {
        let alice = KeyPair::new().unwrap();
        let bob = KeyPair::new().unwrap();
        let (_, utxos) = funded(&alice);
        let mut tx = Transaction::new_transaction(
            &utxos,
            &alice.get_address(),
            alice.get_public_key(),
            &bob.get_address(),
            UNITS_PER_COIN,
        )
        .unwrap();

        assert!(matches!(
            tx.sign(&alice, &[]),
            Err(BlockchainError::Integrity(_))
        ));
        tx.sign(&alice, &utxos).unwrap();
        assert!(matches!(
            tx.verify_sign(&[]),
            Err(BlockchainError::Integrity(_))
        ));
    }

    #[test]
    fn test_sighash_is_bound_to_input_and_lock() {
        let alice = KeyPair::new().unwrap();
        let bob = KeyPair::new().unwrap();
        let first = Transaction::new_coinbase_tx_at(&alice.get_address(), 1).unwrap();
        let second = Transaction::new_coinbase_tx_at(&alice.get_address(), 2).unwrap();
        let utxos = [first.utxos(), second.utxos()].concat();
        let tx = Transaction::new_transaction(
            &utxos,
            &alice.get_address(),
            alice.get_public_key(),
            &bob.get_address(),
            60 * UNITS_PER_COIN,
        )
        .unwrap();

        let lock = utxos[0].get_pub_key_hash();
        let h0 = tx.compute_sighash(0, lock).unwrap();
        let h1 = tx.compute_sighash(1, lock).unwrap();
        assert_ne!(h0, h1);
        assert_ne!(h0, tx.compute_sighash(0, &[0u8; 21]).unwrap());
        assert_eq!(h0, tx.compute_sighash(0, lock).unwrap());
        assert!(tx.compute_sighash(2, lock).is_err());
    }

    #[test]
    fn test_two_input_spend_binds_each_signature() {
        let alice = KeyPair::new().unwrap();
        let bob = KeyPair::new().unwrap();
        let first = Transaction::new_coinbase_tx_at(&alice.get_address(), 1).unwrap();
        let second = Transaction::new_coinbase_tx_at(&alice.get_address(), 2).unwrap();
        let utxos = [first.utxos(), second.utxos()].concat();
        let mut tx = Transaction::new_transaction(
            &utxos,
            &alice.get_address(),
            alice.get_public_key(),
            &bob.get_address(),
            60 * UNITS_PER_COIN,
        )
        .unwrap();
        tx.sign(&alice, &utxos).unwrap();
        assert!(tx.verify_sign(&utxos).is_ok());

        let swapped = [utxos[1].clone(), utxos[0].clone()];
        assert!(matches!(
            tx.verify_sign(&swapped),
            Err(BlockchainError::Signature(_))
        ));

        let mut copied = tx.clone();
        copied.vin[1].signature = copied.vin[0].signature.clone();
        assert!(matches!(
            copied.verify_sign(&utxos),
            Err(BlockchainError::Signature(_))
        ));
    }

    #[test]
    fn test_spend_without_inputs_rejected() {
        let alice = KeyPair::new().unwrap();
        let address = alice.get_address();
        let mut tx = Transaction {
            hash: [0u8; 32],
            vin: vec![],
            vout: vec![
                TXOutput::new(1000 * UNITS_PER_COIN, &address).unwrap(),
                TXOutput::new(1000 * UNITS_PER_COIN, &address).unwrap(),
            ],
            locked_time: 7,
        };
        tx.hash = tx.content_hash().unwrap();

        assert!(!tx.is_coinbase());
        assert!(matches!(
            tx.verify_sign(&[]),
            Err(BlockchainError::Integrity(_))
        ));
    }

    #[test]
    fn test_outputs_above_inputs_rejected() {
        let alice = KeyPair::new().unwrap();
        let bob = KeyPair::new().unwrap();
        let (_, utxos) = funded(&alice);
        let mut tx = Transaction::new_transaction(
            &utxos,
            &alice.get_address(),
            alice.get_public_key(),
            &bob.get_address(),
            BLOCK_REWARD,
        )
        .unwrap();
        tx.vout[0].value = BLOCK_REWARD + 1;
        tx.hash = tx.content_hash().unwrap();
        tx.sign(&alice, &utxos).unwrap();

        assert!(matches!(
            tx.verify_sign(&utxos),
            Err(BlockchainError::Integrity(_))
        ));
    }

    #[test]
    fn test_serialize_round_trip() {
        let alice = KeyPair::new().unwrap();
        let bob = KeyPair::new().unwrap();
        let (_, utxos) = funded(&alice);
        let mut tx = Transaction::new_transaction(
            &utxos,
            &alice.get_address(),
            alice.get_public_key(),
            &bob.get_address(),
            UNITS_PER_COIN,
        )
        .unwrap();
        tx.sign(&alice, &utxos).unwrap();

        let bytes = tx.serialize().unwrap();
        assert_eq!(Transaction::deserialize(&bytes).unwrap(), tx);
    }
}
