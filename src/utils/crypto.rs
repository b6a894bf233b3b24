use ring::digest::{Context, SHA256};
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, KeyPair, UnparsedPublicKey, ECDSA_P256_SHA256_FIXED,
    ECDSA_P256_SHA256_FIXED_SIGNING,
};
use ripemd::{Digest as RipemdDigest, Ripemd160};

use crate::error::{BlockchainError, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// Width of one P-256 coordinate or signature scalar.
pub const SCALAR_LEN: usize = 32;
/// Public keys are X‖Y without the SEC1 tag byte.
pub const PUBLIC_KEY_LEN: usize = 2 * SCALAR_LEN;
pub const SIGNATURE_LEN: usize = 2 * SCALAR_LEN;

const SEC1_UNCOMPRESSED_TAG: u8 = 0x04;

/// Unix time in seconds.
pub fn current_timestamp() -> Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| BlockchainError::Crypto(format!("System time error: {e}")))?
        .as_secs();

    i64::try_from(duration).map_err(|_| BlockchainError::Crypto("Timestamp overflow".to_string()))
}

pub fn sha256_digest(data: &[u8]) -> [u8; 32] {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    let mut out = [0u8; 32];
    out.copy_from_slice(digest.as_ref());
    out
}

pub fn ripemd160_digest(data: &[u8]) -> Vec<u8> {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

pub fn base58_decode(data: &str) -> Result<Vec<u8>> {
    bs58::decode(data)
        .into_vec()
        .map_err(|e| BlockchainError::InvalidAddress(format!("Invalid base58 encoding: {e}")))
}

/// ECDSA signature split into its fixed-width scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub r: [u8; SCALAR_LEN],
    pub s: [u8; SCALAR_LEN],
}

impl Signature {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SIGNATURE_LEN);
        bytes.extend_from_slice(&self.r);
        bytes.extend_from_slice(&self.s);
        bytes
    }
}

/// Split stored signature bytes back into (r, s). Only the 64-byte
/// fixed-width form is accepted.
pub fn restore_signature(bytes: &[u8]) -> Result<Signature> {
    if bytes.len() != SIGNATURE_LEN {
        return Err(BlockchainError::Signature(format!(
            "Expected {SIGNATURE_LEN} signature bytes, got {}",
            bytes.len()
        )));
    }
    let mut r = [0u8; SCALAR_LEN];
    let mut s = [0u8; SCALAR_LEN];
    r.copy_from_slice(&bytes[..SCALAR_LEN]);
    s.copy_from_slice(&bytes[SCALAR_LEN..]);
    Ok(Signature { r, s })
}

/// Generate a fresh P-256 key as a PKCS#8 document.
pub fn new_key_pair() -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
        .map_err(|e| BlockchainError::Crypto(format!("Failed to generate ECDSA key pair: {e}")))?
        .as_ref()
        .to_vec();
    Ok(pkcs8)
}

fn load_key_pair(pkcs8: &[u8]) -> Result<EcdsaKeyPair> {
    let rng = SystemRandom::new();
    EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
        .map_err(|e| BlockchainError::Crypto(format!("Failed to create key pair from PKCS8: {e}")))
}

/// X‖Y encoding of the public half of a PKCS#8 key.
pub fn public_key_from_pkcs8(pkcs8: &[u8]) -> Result<Vec<u8>> {
    let key_pair = load_key_pair(pkcs8)?;
    let sec1 = key_pair.public_key().as_ref();
    if sec1.len() != PUBLIC_KEY_LEN + 1 || sec1[0] != SEC1_UNCOMPRESSED_TAG {
        return Err(BlockchainError::Crypto(
            "Unexpected public key encoding".to_string(),
        ));
    }
    Ok(sec1[1..].to_vec())
}

pub fn ecdsa_p256_sha256_sign_digest(pkcs8: &[u8], digest: &[u8]) -> Result<Signature> {
    let rng = SystemRandom::new();
    let key_pair = load_key_pair(pkcs8)?;
    let signature = key_pair
        .sign(&rng, digest)
        .map_err(|e| BlockchainError::Crypto(format!("Failed to sign message: {e}")))?;
    restore_signature(signature.as_ref())
}

/// Verify (r, s) over `digest` for an X‖Y public key. Malformed keys simply
/// fail verification.
pub fn ecdsa_p256_sha256_sign_verify(
    public_key: &[u8],
    digest: &[u8],
    signature: &Signature,
) -> bool {
    if public_key.len() != PUBLIC_KEY_LEN {
        return false;
    }
    let mut sec1 = Vec::with_capacity(PUBLIC_KEY_LEN + 1);
    sec1.push(SEC1_UNCOMPRESSED_TAG);
    sec1.extend_from_slice(public_key);

    let peer_public_key = UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, sec1);
    peer_public_key
        .verify(digest, signature.to_bytes().as_slice())
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let pkcs8 = new_key_pair().unwrap();
        let public_key = public_key_from_pkcs8(&pkcs8).unwrap();
        assert_eq!(public_key.len(), PUBLIC_KEY_LEN);

        let digest = sha256_digest(b"payload");
        let signature = ecdsa_p256_sha256_sign_digest(&pkcs8, &digest).unwrap();
        assert!(ecdsa_p256_sha256_sign_verify(&public_key, &digest, &signature));

        let other = sha256_digest(b"other payload");
        assert!(!ecdsa_p256_sha256_sign_verify(&public_key, &other, &signature));
    }

    #[test]
    fn test_verify_rejects_foreign_key() {
        let signer = new_key_pair().unwrap();
        let stranger = public_key_from_pkcs8(&new_key_pair().unwrap()).unwrap();
        let digest = sha256_digest(b"payload");
        let signature = ecdsa_p256_sha256_sign_digest(&signer, &digest).unwrap();
        assert!(!ecdsa_p256_sha256_sign_verify(&stranger, &digest, &signature));
    }

    #[test]
    fn test_verify_rejects_malformed_public_key() {
        let pkcs8 = new_key_pair().unwrap();
        let digest = sha256_digest(b"payload");
        let signature = ecdsa_p256_sha256_sign_digest(&pkcs8, &digest).unwrap();
        assert!(!ecdsa_p256_sha256_sign_verify(&[1, 2, 3], &digest, &signature));
    }

    #[test]
    fn test_restore_signature_fixed_width() {
        let mut bytes = vec![0u8; SIGNATURE_LEN];
        bytes[0] = 0xAA;
        bytes[SCALAR_LEN] = 0xBB;
        let signature = restore_signature(&bytes).unwrap();
        assert_eq!(signature.r[0], 0xAA);
        assert_eq!(signature.s[0], 0xBB);
        assert_eq!(signature.to_bytes(), bytes);

        // Leading-zero scalars keep their position.
        let mut padded = vec![0u8; SIGNATURE_LEN];
        padded[SIGNATURE_LEN - 1] = 1;
        let signature = restore_signature(&padded).unwrap();
        assert_eq!(signature.r, [0u8; SCALAR_LEN]);
        assert_eq!(signature.s[SCALAR_LEN - 1], 1);
    }

    #[test]
    fn test_restore_signature_rejects_odd_lengths() {
        assert!(restore_signature(&[0u8; 63]).is_err());
        assert!(restore_signature(&[]).is_err());
    }

    #[test]
    fn test_base58_round_trip() {
        let data = vec![0u8, 1, 2, 250, 251];
        assert_eq!(base58_decode(&base58_encode(&data)).unwrap(), data);
        assert!(base58_decode("0OIl").is_err());
    }
}
