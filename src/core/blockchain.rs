// The chain orchestrator. Blocks, the UTXO ledger and the key store live in
// three trees of one sled database; every operation that touches more than
// one of them commits through a single multi-tree transaction so a failure
// leaves no partial write behind.

use crate::config::Settings;
use crate::core::{
    target_for, Block, CancelToken, ProofOfWork, SpendRecord, Transaction, BLOCK_REWARD, UTXO,
    ZERO_HASH,
};
use crate::error::{BlockchainError, Result};
use crate::storage::UTXOSet;
use crate::utils::current_timestamp;
use crate::wallet::{
    address_from_pub_key_hash, hash_pub_key, is_address_valid, lock_hash_from_address, Wallet,
    KEYSTORE_TREE,
};
use data_encoding::HEXLOWER;
use log::{debug, info, warn};
use sled::transaction::{ConflictableTransactionError, Transactional};
use sled::{Db, Tree};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

const BLOCKS_TREE: &str = "blocks";
const LAST_HASH_KEY: &str = "lasthash";

/// UTXO changes a committed block applies, grouped by owning address.
#[derive(Debug, Default)]
struct Reconciliation {
    spends: BTreeMap<String, Vec<SpendRecord>>,
    credits: BTreeMap<String, Vec<UTXO>>,
}

pub struct Blockchain {
    db: Db,
    db_path: PathBuf,
    blocks: Tree,
    utxo_set: UTXOSet,
    wallet: Wallet,
    last_block: Option<Block>,
    difficulty: u32,
    cancel: CancelToken,
}

impl Blockchain {
    pub fn open(settings: &Settings) -> Result<Blockchain> {
        Self::open_with_path(&settings.db_path, settings.difficulty)
    }

    /// Open (or create) the store at `path`. A store without a last-hash
    /// pointer yields an uninitialised chain.
    pub fn open_with_path(path: impl AsRef<Path>, difficulty: u32) -> Result<Blockchain> {
        target_for(difficulty)?;

        let db_path = path.as_ref().to_path_buf();
        let db = sled::open(&db_path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        let blocks = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;
        let utxo_set = UTXOSet::new(&db)?;
        let keystore = db
            .open_tree(KEYSTORE_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open key store: {e}")))?;
        let wallet = Wallet::load(keystore)?;

        let last_block = match blocks.get(LAST_HASH_KEY)? {
            Some(bytes) => {
                let hash = to_block_hash(bytes.as_ref())?;
                let block = read_block(&blocks, &hash)?.ok_or_else(|| {
                    BlockchainError::Database(format!(
                        "Last block {} is missing from the block store",
                        HEXLOWER.encode(&hash)
                    ))
                })?;
                Some(block)
            }
            None => None,
        };

        match &last_block {
            Some(block) => info!(
                "Opened chain at {} with tip {} (height {})",
                db_path.display(),
                block.get_hash_hex(),
                block.get_height()
            ),
            None => info!("Opened empty chain store at {}", db_path.display()),
        }

        Ok(Blockchain {
            db,
            db_path,
            blocks,
            utxo_set,
            wallet,
            last_block,
            difficulty,
            cancel: CancelToken::new(),
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.last_block.is_some()
    }

    /// Persist a genesis block holding `coinbase_txs`. Returns `false`
    /// without touching the store when a chain already exists.
    pub fn create_with_genesis(&mut self, coinbase_txs: &[Transaction]) -> Result<bool> {
        if self.blocks.contains_key(LAST_HASH_KEY)? {
            debug!("Genesis requested but a chain already exists");
            return Ok(false);
        }
        if let Some(tx) = coinbase_txs.iter().find(|tx| !tx.is_coinbase()) {
            return Err(BlockchainError::InvalidBlock(format!(
                "Genesis transaction {} is not a coinbase",
                HEXLOWER.encode(tx.get_hash())
            )));
        }

        let plan = self.plan_reconciliation(coinbase_txs)?;
        let genesis = self.mine(|cancel, difficulty| {
            Block::new_genesis_block(coinbase_txs, difficulty, cancel)
        })?;
        self.commit_block(genesis, &plan, None)?;
        Ok(true)
    }

    /// Start the chain with a genesis coinbase paying `address`, and make
    /// `address` the coinbase recipient for later blocks.
    pub fn create_coinbase(&mut self, address: &str) -> Result<Block> {
        if !is_address_valid(address) {
            return Err(BlockchainError::InvalidAddress(address.to_string()));
        }
        if self.blocks.contains_key(LAST_HASH_KEY)? {
            return Err(BlockchainError::Validation(
                "Chain already exists; genesis can only be created once".to_string(),
            ));
        }

        let coinbase_tx = Transaction::new_coinbase_tx(address)?;
        let txs = [coinbase_tx];
        let plan = self.plan_reconciliation(&txs)?;
        let genesis =
            self.mine(|cancel, difficulty| Block::new_genesis_block(&txs, difficulty, cancel))?;
        self.commit_block(genesis.clone(), &plan, Some(address))?;
        info!("Created genesis block {} for {address}", genesis.get_hash_hex());
        Ok(genesis)
    }

    /// Persisted UTXOs of `address` adjusted by transactions not yet in a
    /// block: outputs spent by `pending` inputs signed with the address's
    /// key are removed and outputs `pending` locks to the address are added.
    pub fn get_spendable_utxos(&self, address: &str, pending: &[Transaction]) -> Result<Vec<UTXO>> {
        let lock_hash = lock_hash_from_address(address)?;

        let consumed: HashSet<SpendRecord> = pending
            .iter()
            .flat_map(|tx| tx.get_vin())
            .filter(|input| input.uses_key(&lock_hash))
            .map(SpendRecord::from)
            .collect();

        let mut spendable: Vec<UTXO> = self
            .utxo_set
            .query_by_address(address)?
            .into_iter()
            .filter(|utxo| !consumed.contains(&utxo.record()))
            .collect();

        for tx in pending {
            spendable.extend(tx.utxos().into_iter().filter(|utxo| {
                utxo.get_output().is_locked_with_key(&lock_hash)
                    && !consumed.contains(&utxo.record())
            }));
        }
        Ok(spendable)
    }

    pub fn get_balance(&self, address: &str) -> Result<u64> {
        self.get_balance_with_pending(address, &[])
    }

    pub fn get_balance_with_pending(&self, address: &str, pending: &[Transaction]) -> Result<u64> {
        if !is_address_valid(address) {
            return Err(BlockchainError::InvalidAddress(address.to_string()));
        }
        Ok(self
            .get_spendable_utxos(address, pending)?
            .iter()
            .map(UTXO::get_value)
            .sum())
    }

    /// Build, sign and mine one transfer per (from, to, value) triple, with
    /// a coinbase for the configured recipient in front. Either the whole
    /// batch lands in one block or nothing changes.
    pub fn send_transaction(
        &mut self,
        from: &[String],
        to: &[String],
        values: &[u64],
    ) -> Result<Block> {
        if from.len() != to.len() || from.len() != values.len() {
            return Err(BlockchainError::Validation(format!(
                "Argument lists differ in length: {} senders, {} recipients, {} values",
                from.len(),
                to.len(),
                values.len()
            )));
        }
        if from.is_empty() {
            return Err(BlockchainError::Validation(
                "At least one transfer is required".to_string(),
            ));
        }
        if !self.is_initialized() {
            return Err(BlockchainError::Validation(
                "Chain has no genesis block; create one first".to_string(),
            ));
        }
        let coinbase = self
            .wallet
            .coinbase()
            .map(str::to_string)
            .ok_or_else(|| {
                BlockchainError::Validation("No coinbase recipient configured".to_string())
            })?;
        for address in from.iter().chain(to) {
            if !is_address_valid(address) {
                return Err(BlockchainError::InvalidAddress(address.to_string()));
            }
        }

        let mut batch: Vec<Transaction> = Vec::with_capacity(from.len() + 1);
        for ((sender, recipient), &amount) in from.iter().zip(to).zip(values) {
            if amount == 0 {
                return Err(BlockchainError::Validation(
                    "Amount must be positive".to_string(),
                ));
            }
            let key_pair = self.wallet.key_pair(sender).ok_or_else(|| {
                BlockchainError::Wallet(format!("No private key for address {sender}"))
            })?;

            let spendable = self.get_spendable_utxos(sender, &batch)?;
            let selected = select_utxos(&spendable, amount).ok_or_else(|| {
                BlockchainError::InsufficientFunds {
                    required: amount,
                    available: spendable.iter().map(UTXO::get_value).sum(),
                }
            })?;

            let mut tx = Transaction::new_transaction(
                selected,
                sender,
                key_pair.get_public_key(),
                recipient,
                amount,
            )?;
            tx.sign(key_pair, selected)?;
            debug!(
                "Built transaction {} sending {amount} from {sender} to {recipient}",
                HEXLOWER.encode(tx.get_hash())
            );
            batch.push(tx);
        }

        let coinbase_tx = self.unique_coinbase(&coinbase, &batch)?;
        batch.insert(0, coinbase_tx);

        self.add_block(&batch)
    }

    /// Verify `transactions`, mine them on top of the last block and
    /// reconcile the UTXO set in the same store transaction.
    pub fn add_block(&mut self, transactions: &[Transaction]) -> Result<Block> {
        let (prev_height, prev_hash) = match &self.last_block {
            Some(block) => (block.get_height(), *block.get_hash()),
            None => {
                return Err(BlockchainError::Validation(
                    "Chain has no genesis block; create one first".to_string(),
                ))
            }
        };

        for (idx, tx) in transactions.iter().enumerate() {
            if tx.is_coinbase() {
                check_block_coinbase(idx, tx)?;
                continue;
            }
            let utxos = self.find_spent_utxos(tx, transactions)?;
            if let Err(e) = tx.verify_sign(&utxos) {
                warn!(
                    "Rejecting batch: transaction {} failed verification: {e}",
                    HEXLOWER.encode(tx.get_hash())
                );
                return Err(e);
            }
        }

        let plan = self.plan_reconciliation(transactions)?;
        let block = self.mine(|cancel, difficulty| {
            Block::new_block(prev_height, prev_hash, transactions, difficulty, cancel)
        })?;
        self.commit_block(block.clone(), &plan, None)?;
        Ok(block)
    }

    /// The UTXOs `tx` claims, in input order. Each input is looked up in the
    /// UTXO set under the address of its public key, then among the other
    /// transactions of `batch`.
    pub fn find_spent_utxos(&self, tx: &Transaction, batch: &[Transaction]) -> Result<Vec<UTXO>> {
        let mut by_address: HashMap<String, Vec<UTXO>> = HashMap::new();
        let mut spent = Vec::with_capacity(tx.get_vin().len());

        for input in tx.get_vin() {
            let record = SpendRecord::from(input);
            let address = address_from_pub_key_hash(&hash_pub_key(input.get_pub_key()));
            if !by_address.contains_key(&address) {
                let recorded = self.utxo_set.query_by_address(&address)?;
                by_address.insert(address.clone(), recorded);
            }

            let persisted = by_address
                .get(&address)
                .and_then(|utxos| utxos.iter().find(|utxo| utxo.matches_record(&record)));
            let found = match persisted {
                Some(utxo) => Some(utxo.clone()),
                None => batch
                    .iter()
                    .filter(|other| other.get_hash() != tx.get_hash())
                    .flat_map(Transaction::utxos)
                    .find(|utxo| utxo.matches_record(&record)),
            };

            let utxo = found.ok_or_else(|| {
                BlockchainError::Integrity(format!(
                    "Input {}:{} of {} references an unknown output",
                    HEXLOWER.encode(record.get_txid()),
                    record.get_vout(),
                    HEXLOWER.encode(tx.get_hash())
                ))
            })?;
            spent.push(utxo);
        }
        Ok(spent)
    }

    /// Coinbase for `address` whose hash differs from every unspent output
    /// of the address and from the rest of the batch.
    fn unique_coinbase(&self, address: &str, batch: &[Transaction]) -> Result<Transaction> {
        let taken: HashSet<[u8; 32]> = self
            .utxo_set
            .query_by_address(address)?
            .iter()
            .map(|utxo| *utxo.get_txid())
            .chain(batch.iter().map(|tx| *tx.get_hash()))
            .collect();

        let mut locked_time = current_timestamp()?;
        loop {
            let tx = Transaction::new_coinbase_tx_at(address, locked_time)?;
            if !taken.contains(tx.get_hash()) {
                return Ok(tx);
            }
            debug!("Coinbase at {locked_time} collides with an unspent output, advancing");
            locked_time += 1;
        }
    }

    /// Outputs not consumed inside the batch are credited; inputs that spend
    /// persisted outputs are removed. Outputs both created and consumed
    /// within the batch never touch the set.
    fn plan_reconciliation(&self, transactions: &[Transaction]) -> Result<Reconciliation> {
        let batch_hashes: HashSet<[u8; 32]> =
            transactions.iter().map(|tx| *tx.get_hash()).collect();
        if batch_hashes.len() != transactions.len() {
            return Err(BlockchainError::Integrity(
                "Batch contains duplicate transactions".to_string(),
            ));
        }

        let mut consumed: HashSet<SpendRecord> = HashSet::new();
        let mut plan = Reconciliation::default();
        for input in transactions.iter().flat_map(|tx| tx.get_vin()) {
            let record = SpendRecord::from(input);
            if !consumed.insert(record) {
                return Err(BlockchainError::Integrity(format!(
                    "Output {}:{} is spent twice in one batch",
                    HEXLOWER.encode(record.get_txid()),
                    record.get_vout()
                )));
            }
            if batch_hashes.contains(record.get_txid()) {
                continue;
            }
            let address = address_from_pub_key_hash(&hash_pub_key(input.get_pub_key()));
            plan.spends.entry(address).or_default().push(record);
        }

        for utxo in transactions.iter().flat_map(Transaction::utxos) {
            if consumed.contains(&utxo.record()) {
                continue;
            }
            let address = address_from_pub_key_hash(utxo.get_pub_key_hash());
            plan.credits.entry(address).or_default().push(utxo);
        }
        Ok(plan)
    }

    /// Run one nonce search. A cancel issued while no search was running
    /// is discarded when the search starts.
    fn mine<F>(&self, build: F) -> Result<Block>
    where
        F: FnOnce(&CancelToken, u32) -> Result<Block>,
    {
        self.cancel.reset();
        let result = build(&self.cancel, self.difficulty);
        if let Err(BlockchainError::Mining(reason)) = &result {
            warn!("Mining aborted: {reason}");
            self.cancel.reset();
        }
        result
    }

    /// Append `block`, apply `plan` to the UTXO set and optionally record
    /// the coinbase recipient, all in one store transaction.
    fn commit_block(
        &mut self,
        block: Block,
        plan: &Reconciliation,
        coinbase: Option<&str>,
    ) -> Result<()> {
        let block_bytes = block.serialize()?;
        let block_hash = *block.get_hash();

        (&self.blocks, self.utxo_set.tree(), self.wallet.store()).transaction(
            |(blocks, utxos, keystore)| {
                let tip = blocks.get(LAST_HASH_KEY)?;
                let extends_tip = match &tip {
                    Some(hash) => hash[..] == block.get_pre_block_hash()[..],
                    None => block.is_genesis(),
                };
                if !extends_tip {
                    return Err(ConflictableTransactionError::Abort(
                        BlockchainError::Integrity(format!(
                            "Block {} does not extend the current tip",
                            HEXLOWER.encode(&block_hash)
                        )),
                    ));
                }

                blocks.insert(&block_hash[..], block_bytes.as_slice())?;
                blocks.insert(LAST_HASH_KEY, &block_hash[..])?;
                for (address, records) in &plan.spends {
                    UTXOSet::spend_in(utxos, address, records)?;
                }
                for (address, credits) in &plan.credits {
                    UTXOSet::credit_in(utxos, address, credits)?;
                }
                if let Some(address) = coinbase {
                    Wallet::stage_coinbase(keystore, address)?;
                }
                Ok(())
            },
        )?;

        // Cached state follows the committed store even when the flush fails.
        if let Some(address) = coinbase {
            self.wallet.coinbase_committed(address);
        }
        self.last_block = Some(block.clone());
        if let Err(e) = self.db.flush() {
            warn!(
                "Block {} committed but flushing to disk failed: {e}",
                HEXLOWER.encode(&block_hash)
            );
        }

        info!(
            "Committed block {} at height {} with {} transactions ({} addresses credited, {} debited)",
            HEXLOWER.encode(&block_hash),
            block.get_height(),
            block.get_transactions().len(),
            plan.credits.len(),
            plan.spends.len()
        );
        Ok(())
    }

    pub fn get_last_block(&self) -> Option<&Block> {
        self.last_block.as_ref()
    }

    pub fn get_best_height(&self) -> Option<i64> {
        self.last_block.as_ref().map(Block::get_height)
    }

    pub fn get_block_count(&self) -> usize {
        self.get_best_height()
            .map(|height| height as usize + 1)
            .unwrap_or(0)
    }

    pub fn get_block(&self, hash: &[u8; 32]) -> Result<Option<Block>> {
        read_block(&self.blocks, hash)
    }

    /// Every block from the tip back to genesis.
    pub fn get_all_blocks(&self) -> Result<Vec<Block>> {
        self.iterator().collect()
    }

    /// Cursor positioned at the current tip.
    pub fn cursor(&self) -> ChainCursor {
        let current_hash = self
            .last_block
            .as_ref()
            .map(|block| *block.get_hash())
            .unwrap_or(ZERO_HASH);
        ChainCursor::new(current_hash, self.blocks.clone())
    }

    pub fn iterator(&self) -> BlockchainIterator {
        BlockchainIterator {
            cursor: self.cursor(),
        }
    }

    /// Walk tip to genesis re-checking proof-of-work, merkle roots, heights
    /// and links. Returns the number of blocks checked.
    pub fn verify_chain(&self) -> Result<usize> {
        let mut expected_height = self.get_best_height();
        let mut expected_hash = self.last_block.as_ref().map(|block| *block.get_hash());
        let mut checked = 0;

        for block in self.iterator() {
            let block = block?;
            let hash_hex = block.get_hash_hex();
            if Some(*block.get_hash()) != expected_hash {
                return Err(BlockchainError::InvalidBlock(format!(
                    "Block {hash_hex} is not the one its successor links to"
                )));
            }
            if Some(block.get_height()) != expected_height {
                return Err(BlockchainError::InvalidBlock(format!(
                    "Block {hash_hex} has height {}, expected {expected_height:?}",
                    block.get_height()
                )));
            }
            if !ProofOfWork::validate(&block, self.difficulty)? {
                return Err(BlockchainError::InvalidBlock(format!(
                    "Block {hash_hex} fails proof-of-work"
                )));
            }
            if !block.verify_merkle_root()? {
                return Err(BlockchainError::InvalidBlock(format!(
                    "Block {hash_hex} has a wrong merkle root"
                )));
            }
            if block.get_height() == 0 && !block.is_genesis() {
                return Err(BlockchainError::InvalidBlock(format!(
                    "Block {hash_hex} at height 0 does not start from the zero hash"
                )));
            }

            expected_height = Some(block.get_height() - 1);
            expected_hash = Some(*block.get_pre_block_hash());
            checked += 1;
        }

        if expected_height.is_some_and(|height| height != -1) {
            return Err(BlockchainError::InvalidBlock(
                "Chain ends before reaching genesis".to_string(),
            ));
        }
        debug!("Verified {checked} blocks");
        Ok(checked)
    }

    /// Token that aborts the nonce search in flight when cancelled. A cancel
    /// issued while nothing is mining has no effect.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn get_new_address(&mut self) -> Result<String> {
        self.wallet.create_new_address()
    }

    pub fn list_addresses(&self) -> Vec<String> {
        self.wallet.addresses()
    }

    pub fn dump_private_key(&self, address: &str) -> Result<Vec<u8>> {
        self.wallet.dump_private_key(address)
    }

    pub fn set_coinbase(&mut self, address: &str) -> Result<()> {
        self.wallet.set_coinbase(address)
    }

    pub fn get_coinbase(&self) -> Option<&str> {
        self.wallet.coinbase()
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn utxo_set(&self) -> &UTXOSet {
        &self.utxo_set
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }
}

/// A block may open with one coinbase paying exactly the block reward.
fn check_block_coinbase(idx: usize, tx: &Transaction) -> Result<()> {
    let hash = HEXLOWER.encode(tx.get_hash());
    if idx != 0 {
        return Err(BlockchainError::Integrity(format!(
            "Coinbase {hash} at position {idx}; only the first transaction may be a coinbase"
        )));
    }
    let paid = tx.get_output_value()?;
    if paid != BLOCK_REWARD {
        return Err(BlockchainError::Integrity(format!(
            "Coinbase {hash} pays {paid}, block reward is {BLOCK_REWARD}"
        )));
    }
    Ok(())
}

/// Shortest prefix of `utxos` worth at least `amount`.
fn select_utxos(utxos: &[UTXO], amount: u64) -> Option<&[UTXO]> {
    let mut accumulated = 0u64;
    for (idx, utxo) in utxos.iter().enumerate() {
        accumulated = accumulated.saturating_add(utxo.get_value());
        if accumulated >= amount {
            return Some(&utxos[..=idx]);
        }
    }
    None
}

fn to_block_hash(bytes: &[u8]) -> Result<[u8; 32]> {
    bytes.try_into().map_err(|_| {
        BlockchainError::Database(format!(
            "Stored block hash has {} bytes, expected 32",
            bytes.len()
        ))
    })
}

fn read_block(blocks: &Tree, hash: &[u8; 32]) -> Result<Option<Block>> {
    match blocks.get(hash)? {
        Some(bytes) => Ok(Some(Block::deserialize(bytes.as_ref())?)),
        None => Ok(None),
    }
}

/// Position in a backward walk over the block store. Stepping returns the
/// block at the position and a new cursor at its predecessor, so cursors
/// can be copied and walked independently.
#[derive(Clone)]
pub struct ChainCursor {
    current_hash: [u8; 32],
    blocks: Tree,
}

impl ChainCursor {
    fn new(current_hash: [u8; 32], blocks: Tree) -> ChainCursor {
        ChainCursor {
            current_hash,
            blocks,
        }
    }

    pub fn current_hash(&self) -> &[u8; 32] {
        &self.current_hash
    }

    pub fn has_previous(&self) -> bool {
        self.current_hash != ZERO_HASH
    }

    pub fn step(&self) -> Result<(Block, ChainCursor)> {
        if !self.has_previous() {
            return Err(BlockchainError::InvalidBlock(
                "Traversal already reached genesis".to_string(),
            ));
        }
        let block = read_block(&self.blocks, &self.current_hash)?.ok_or_else(|| {
            BlockchainError::Database(format!(
                "Block {} is missing from the block store",
                HEXLOWER.encode(&self.current_hash)
            ))
        })?;
        let previous = ChainCursor::new(*block.get_pre_block_hash(), self.blocks.clone());
        Ok((block, previous))
    }
}

/// Tip-to-genesis iterator. A store error is yielded once and ends the walk.
pub struct BlockchainIterator {
    cursor: ChainCursor,
}

impl Iterator for BlockchainIterator {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.cursor.has_previous() {
            return None;
        }
        match self.cursor.step() {
            Ok((block, previous)) => {
                self.cursor = previous;
                Some(Ok(block))
            }
            Err(e) => {
                self.cursor.current_hash = ZERO_HASH;
                Some(Err(e))
            }
        }
    }
}
