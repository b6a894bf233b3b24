// Wire codec shared by storage, hashing and proof-of-work.
// Integers are fixed-width big-endian so the bytes that get hashed never
// depend on the magnitude of a value.
use crate::error::{BlockchainError, Result};
use bincode::config::{BigEndian, Configuration, Fixint};
use serde::{Deserialize, Serialize};

fn wire_config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

/// Serialize data using the ledger wire configuration
pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    bincode::encode_to_vec(data, wire_config())
        .map_err(|e| BlockchainError::Serialization(format!("Serialization failed: {e}")))
}

/// Deserialize data using the ledger wire configuration
pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let (data, _) = bincode::decode_from_slice(bytes, wire_config())
        .map_err(|e| BlockchainError::Serialization(format!("Deserialization failed: {e}")))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
    struct TestData {
        id: u64,
        name: String,
        hash: [u8; 32],
    }

    #[test]
    fn test_serialize_deserialize() {
        let original = TestData {
            id: 42,
            name: "test".to_string(),
            hash: [7u8; 32],
        };

        let serialized = serialize(&original).expect("Serialization should work");
        let deserialized: TestData = deserialize(&serialized).expect("Deserialization should work");

        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_integers_are_fixed_width_big_endian() {
        let small = serialize(&1i64).unwrap();
        let large = serialize(&i64::MAX).unwrap();
        assert_eq!(small, vec![0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(large.len(), 8);
    }

    #[test]
    fn test_fixed_arrays_have_no_length_prefix() {
        let bytes = serialize(&[9u8; 32]).unwrap();
        assert_eq!(bytes.len(), 32);
    }

    #[test]
    fn test_deserialize_invalid_data() {
        let invalid_bytes = vec![0xFF, 0xFF, 0xFF, 0xFF];
        let result: Result<TestData> = deserialize(&invalid_bytes);
        assert!(result.is_err());
    }
}
