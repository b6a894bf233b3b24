// Checksummed addresses: base58(version ‖ ripemd160(sha256(pubkey)) ‖ checksum)
use crate::error::{BlockchainError, Result};
use crate::utils::{base58_decode, base58_encode, ripemd160_digest, sha256_digest};

pub const VERSION: u8 = 0x00;
pub const ADDRESS_CHECK_SUM_LEN: usize = 4;
/// Version byte plus the 20-byte RIPEMD-160 digest.
pub const LOCK_HASH_LEN: usize = 21;

pub fn encode(bytes: &[u8]) -> String {
    base58_encode(bytes)
}

pub fn decode(address: &str) -> Result<Vec<u8>> {
    base58_decode(address)
}

/// Versioned public key hash (the lock hash carried by outputs).
pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    let pub_key_sha256 = sha256_digest(pub_key);
    let mut versioned = vec![VERSION];
    versioned.extend(ripemd160_digest(&pub_key_sha256));
    versioned
}

fn checksum(payload: &[u8]) -> Vec<u8> {
    let first_sha = sha256_digest(payload);
    let second_sha = sha256_digest(&first_sha);
    second_sha[0..ADDRESS_CHECK_SUM_LEN].to_vec()
}

/// Address for an already versioned public key hash.
pub fn address_from_pub_key_hash(pub_key_hash: &[u8]) -> String {
    let mut payload = pub_key_hash.to_vec();
    payload.extend(checksum(pub_key_hash));
    encode(&payload)
}

pub fn new_address(pub_key: &[u8]) -> String {
    address_from_pub_key_hash(&hash_pub_key(pub_key))
}

pub fn is_address_valid(address: &str) -> bool {
    let payload = match decode(address) {
        Ok(payload) => payload,
        Err(_) => return false,
    };

    if payload.len() < ADDRESS_CHECK_SUM_LEN {
        return false;
    }

    let (body, actual_checksum) = payload.split_at(payload.len() - ADDRESS_CHECK_SUM_LEN);
    checksum(body) == actual_checksum
}

/// Versioned public key hash an address locks to.
pub fn lock_hash_from_address(address: &str) -> Result<Vec<u8>> {
    if !is_address_valid(address) {
        return Err(BlockchainError::InvalidAddress(address.to_string()));
    }
    let payload = decode(address)?;
    let lock_hash = payload[..payload.len() - ADDRESS_CHECK_SUM_LEN].to_vec();
    if lock_hash.len() != LOCK_HASH_LEN {
        return Err(BlockchainError::InvalidAddress(format!(
            "{address}: expected a {LOCK_HASH_LEN}-byte key hash"
        )));
    }
    Ok(lock_hash)
}
