//! Wallet management and address handling
//!
//! Address encoding and validation, key pairs, and the persisted wallet that
//! maps addresses to keys and remembers the coinbase recipient.

pub mod address;
pub mod key_pair;
#[allow(clippy::module_inception)]
pub mod wallet;

pub use address::{
    address_from_pub_key_hash, hash_pub_key, is_address_valid, lock_hash_from_address,
    new_address, ADDRESS_CHECK_SUM_LEN,
};
pub use key_pair::KeyPair;
pub use wallet::{Wallet, KEYSTORE_TREE};
