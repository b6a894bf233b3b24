use crate::core::{SpendRecord, UTXO};
use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use data_encoding::HEXLOWER;
use log::debug;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree,
};
use sled::{Db, Tree};
use std::collections::HashSet;

pub const UTXO_TREE: &str = "utxoset";

/// Address → unspent outputs. Each address's list is rewritten whole inside
/// a sled transaction, so concurrent writers to one address conflict and
/// retry instead of losing updates.
pub struct UTXOSet {
    tree: Tree, // Keyed by base58 address, value is the encoded Vec<UTXO>
}

impl UTXOSet {
    pub fn new(db: &Db) -> Result<UTXOSet> {
        let tree = db
            .open_tree(UTXO_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open UTXO tree: {e}")))?;
        Ok(UTXOSet { tree })
    }

    // I hand the raw tree to the chain so block commits can join it in one transaction
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    // An address I have never credited simply has no UTXOs
    pub fn query_by_address(&self, address: &str) -> Result<Vec<UTXO>> {
        match self.tree.get(address.as_bytes())? {
            Some(bytes) => deserialize::<Vec<UTXO>>(bytes.as_ref()),
            None => Ok(vec![]),
        }
    }

    /// The recorded UTXOs named by `records`, in record order. Fails if any
    /// record is not present for `address`.
    pub fn query_spent(&self, address: &str, records: &[SpendRecord]) -> Result<Vec<UTXO>> {
        let utxos = self.query_by_address(address)?;
        records
            .iter()
            .map(|record| {
                utxos
                    .iter()
                    .find(|utxo| utxo.matches_record(record))
                    .cloned()
                    .ok_or_else(|| missing_record(address, record))
            })
            .collect()
    }

    pub fn credit(&self, address: &str, utxos: &[UTXO]) -> Result<()> {
        self.tree
            .transaction(|tree| Self::credit_in(tree, address, utxos))?;
        Ok(())
    }

    /// Remove the UTXOs named by `records` and return them. Nothing is
    /// removed unless every record is present.
    pub fn spend(&self, address: &str, records: &[SpendRecord]) -> Result<Vec<UTXO>> {
        let spent = self
            .tree
            .transaction(|tree| Self::spend_in(tree, address, records))?;
        Ok(spent)
    }

    /// Credit inside a caller-owned multi-tree transaction.
    pub(crate) fn credit_in(
        tree: &TransactionalTree,
        address: &str,
        utxos: &[UTXO],
    ) -> ConflictableTransactionResult<(), BlockchainError> {
        let mut recorded = read_in(tree, address)?;
        apply_credit(&mut recorded, utxos).map_err(ConflictableTransactionError::Abort)?;
        write_in(tree, address, &recorded)?;
        debug!("Credited {} UTXOs to {address}", utxos.len());
        Ok(())
    }

    /// Spend inside a caller-owned multi-tree transaction.
    pub(crate) fn spend_in(
        tree: &TransactionalTree,
        address: &str,
        records: &[SpendRecord],
    ) -> ConflictableTransactionResult<Vec<UTXO>, BlockchainError> {
        let mut recorded = read_in(tree, address)?;
        let spent = apply_spend(&mut recorded, address, records)
            .map_err(ConflictableTransactionError::Abort)?;
        write_in(tree, address, &recorded)?;
        debug!("Spent {} UTXOs of {address}", spent.len());
        Ok(spent)
    }
}

fn read_in(
    tree: &TransactionalTree,
    address: &str,
) -> ConflictableTransactionResult<Vec<UTXO>, BlockchainError> {
    match tree.get(address.as_bytes())? {
        Some(bytes) => {
            deserialize::<Vec<UTXO>>(bytes.as_ref()).map_err(ConflictableTransactionError::Abort)
        }
        None => Ok(vec![]),
    }
}

fn write_in(
    tree: &TransactionalTree,
    address: &str,
    utxos: &[UTXO],
) -> ConflictableTransactionResult<(), BlockchainError> {
    if utxos.is_empty() {
        tree.remove(address.as_bytes())?;
    } else {
        let bytes = serialize(&utxos.to_vec()).map_err(ConflictableTransactionError::Abort)?;
        tree.insert(address.as_bytes(), bytes)?;
    }
    Ok(())
}

fn apply_credit(recorded: &mut Vec<UTXO>, utxos: &[UTXO]) -> Result<()> {
    let mut seen: HashSet<SpendRecord> = recorded.iter().map(UTXO::record).collect();
    for utxo in utxos {
        if !seen.insert(utxo.record()) {
            return Err(BlockchainError::Integrity(format!(
                "UTXO {}:{} is already recorded",
                HEXLOWER.encode(utxo.get_txid()),
                utxo.get_vout()
            )));
        }
    }
    recorded.extend_from_slice(utxos);
    Ok(())
}

fn apply_spend(
    recorded: &mut Vec<UTXO>,
    address: &str,
    records: &[SpendRecord],
) -> Result<Vec<UTXO>> {
    let mut spent = Vec::with_capacity(records.len());
    for record in records {
        let position = recorded
            .iter()
            .position(|utxo| utxo.matches_record(record))
            .ok_or_else(|| missing_record(address, record))?;
        spent.push(recorded.remove(position));
    }
    Ok(spent)
}

fn missing_record(address: &str, record: &SpendRecord) -> BlockchainError {
    BlockchainError::Integrity(format!(
        "UTXO {}:{} is not recorded for {address}",
        HEXLOWER.encode(record.get_txid()),
        record.get_vout()
    ))
}
