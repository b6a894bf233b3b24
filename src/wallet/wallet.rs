use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use crate::wallet::{is_address_valid, KeyPair};
use log::{debug, info};
use sled::transaction::{TransactionalTree, UnabortableTransactionError};
use sled::Tree;
use std::collections::HashMap;

pub const KEYSTORE_TREE: &str = "keystore";
const ADDRESS_KEYPAIR_KEY: &str = "address_keypair";
const COINBASE_KEY: &str = "coinbase";

/// Address → key pair map plus the designated coinbase recipient,
/// persisted in the key-store tree.
pub struct Wallet {
    key_pairs: HashMap<String, KeyPair>,
    coinbase: Option<String>,
    store: Tree,
}

impl Wallet {
    /// Load the wallet from its tree; an empty tree yields an empty wallet.
    pub fn load(store: Tree) -> Result<Wallet> {
        let key_pairs = match store.get(ADDRESS_KEYPAIR_KEY)? {
            Some(bytes) => deserialize::<HashMap<String, KeyPair>>(bytes.as_ref())?,
            None => HashMap::new(),
        };

        let coinbase = match store.get(COINBASE_KEY)? {
            Some(bytes) => Some(String::from_utf8(bytes.to_vec()).map_err(|e| {
                BlockchainError::Database(format!("Invalid coinbase address encoding: {e}"))
            })?),
            None => None,
        };

        debug!("Loaded wallet with {} addresses", key_pairs.len());
        Ok(Wallet {
            key_pairs,
            coinbase,
            store,
        })
    }

    /// Write the in-memory key pairs back to the store.
    pub fn flush(&self) -> Result<()> {
        let bytes = serialize(&self.key_pairs)?;
        self.store.insert(ADDRESS_KEYPAIR_KEY, bytes)?;
        self.store.flush()?;
        Ok(())
    }

    pub fn create_new_address(&mut self) -> Result<String> {
        let key_pair = KeyPair::new()?;
        let address = key_pair.get_address();
        self.key_pairs.insert(address.clone(), key_pair);
        if let Err(e) = self.flush() {
            self.key_pairs.remove(&address);
            return Err(e);
        }
        info!("Created new address {address}");
        Ok(address)
    }

    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.key_pairs.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    pub fn key_pair(&self, address: &str) -> Option<&KeyPair> {
        self.key_pairs.get(address)
    }

    /// PKCS#8 document holding the private key for `address`.
    pub fn dump_private_key(&self, address: &str) -> Result<Vec<u8>> {
        if !is_address_valid(address) {
            return Err(BlockchainError::InvalidAddress(address.to_string()));
        }
        self.key_pairs
            .get(address)
            .map(|key_pair| key_pair.get_pkcs8().to_vec())
            .ok_or_else(|| BlockchainError::Wallet(format!("No private key for address {address}")))
    }

    pub fn set_coinbase(&mut self, address: &str) -> Result<()> {
        if !is_address_valid(address) {
            return Err(BlockchainError::InvalidAddress(address.to_string()));
        }
        self.store.insert(COINBASE_KEY, address.as_bytes())?;
        self.store.flush()?;
        self.coinbase = Some(address.to_string());
        info!("Coinbase recipient set to {address}");
        Ok(())
    }

    pub fn coinbase(&self) -> Option<&str> {
        self.coinbase.as_deref()
    }

    pub fn store(&self) -> &Tree {
        &self.store
    }

    /// Write the coinbase pointer inside a larger store transaction. The
    /// in-memory copy is only updated through `coinbase_committed`.
    pub(crate) fn stage_coinbase(
        store: &TransactionalTree,
        address: &str,
    ) -> std::result::Result<(), UnabortableTransactionError> {
        store.insert(COINBASE_KEY, address.as_bytes())?;
        Ok(())
    }

    pub(crate) fn coinbase_committed(&mut self, address: &str) {
        self.coinbase = Some(address.to_string());
    }
}
