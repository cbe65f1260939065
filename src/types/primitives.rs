// Primitives Arbor - Types fondamentaux minimaux
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hash universel (Blake3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hash des données avec Blake3
    pub fn hash(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Hash(*hash.as_bytes())
    }

    /// Full lowercase hex form (64 chars)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Hash(bytes))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }
}

/// Balance in the native unit (u128 = large enough for any realistic supply)
pub type Balance = u128;

/// Nonce pour prévenir replay attacks
pub type Nonce = u64;

/// Gas units
pub type Gas = u64;

/// Identifiant textuel de la chaîne (ex: "arbor-dev")
pub type ChainId = String;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let data = b"Arbor";
        let hash1 = Hash::hash(data);
        let hash2 = Hash::hash(data);
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_hex_parse() {
        let hash = Hash::hash(b"jar");
        let parsed = Hash::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, parsed);
        assert!(Hash::from_hex("zz").is_err());
    }
}
