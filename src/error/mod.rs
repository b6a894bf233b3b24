//! Error handling for the ledger
//!
//! One error type covers every operation. Variants fall into four families:
//! validation (bad caller input), persistence (store or codec failures),
//! signature failures and integrity violations of the UTXO ledger.

use sled::transaction::TransactionError;
use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockchainError {
    /// Database-related errors
    Database(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// Cryptographic operation errors (key generation, signing)
    Crypto(String),
    /// A signature did not verify against its input
    Signature(String),
    /// The UTXO ledger is inconsistent with what an operation expects
    Integrity(String),
    /// Malformed request: mismatched argument lists, bad amounts, chain state
    Validation(String),
    /// Invalid address format or checksum
    InvalidAddress(String),
    /// Insufficient funds for a transfer
    InsufficientFunds { required: u64, available: u64 },
    /// Transaction construction errors
    Transaction(String),
    /// Wallet operation errors
    Wallet(String),
    /// Configuration errors
    Config(String),
    /// File I/O errors
    Io(String),
    /// Block construction or validation errors
    InvalidBlock(String),
    /// Nonce search was cancelled or exhausted
    Mining(String),
}

impl BlockchainError {
    /// True for errors caused by the caller's input rather than by the ledger.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BlockchainError::Validation(_)
                | BlockchainError::InvalidAddress(_)
                | BlockchainError::InsufficientFunds { .. }
        )
    }
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::Database(msg) => write!(f, "Database error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Signature(msg) => write!(f, "Signature error: {msg}"),
            BlockchainError::Integrity(msg) => write!(f, "Integrity error: {msg}"),
            BlockchainError::Validation(msg) => write!(f, "Validation error: {msg}"),
            BlockchainError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            BlockchainError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            BlockchainError::Transaction(msg) => write!(f, "Transaction error: {msg}"),
            BlockchainError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            BlockchainError::Mining(msg) => write!(f, "Mining error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Database(err.to_string())
    }
}

impl From<TransactionError<BlockchainError>> for BlockchainError {
    fn from(err: TransactionError<BlockchainError>) -> Self {
        match err {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(e) => BlockchainError::Database(e.to_string()),
        }
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_family() {
        assert!(BlockchainError::Validation("x".to_string()).is_validation());
        assert!(BlockchainError::InvalidAddress("x".to_string()).is_validation());
        assert!(BlockchainError::InsufficientFunds {
            required: 2,
            available: 1
        }
        .is_validation());
        assert!(!BlockchainError::Integrity("x".to_string()).is_validation());
        assert!(!BlockchainError::Signature("x".to_string()).is_validation());
    }

    #[test]
    fn test_transaction_abort_unwraps_inner_error() {
        let err: BlockchainError =
            TransactionError::Abort(BlockchainError::Integrity("gone".to_string())).into();
        assert_eq!(err, BlockchainError::Integrity("gone".to_string()));
    }
}
