//! Utility functions and helpers
//!
//! Hashing, key and signature primitives, base58, and the wire codec used
//! throughout the ledger.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, new_key_pair, public_key_from_pkcs8, restore_signature,
    ripemd160_digest, sha256_digest, Signature, PUBLIC_KEY_LEN, SIGNATURE_LEN,
};

pub use serialization::{deserialize, serialize};
