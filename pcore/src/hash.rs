use std::fmt;
use std::hash::Hash as StdHash;

use sha2::{Digest, Sha256};

pub const HASH_LEN: usize = 32;

// Wraps the raw sha256 output so the rest of the code never sees the engine
#[derive(PartialEq, Eq, Clone, Copy, StdHash)]
pub struct Hash([u8; HASH_LEN]);

impl Hash {
    pub fn digest(data: &[u8]) -> Hash {
        Hash(Sha256::digest(data).into())
    }

    /// Parent node of two siblings, `sha256(left || right)`
    pub fn pair(left: &Hash, right: &Hash) -> Hash {
        let mut hash = Sha256::new();
        hash.update(left.0);
        hash.update(right.0);
        Hash(hash.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

impl From<[u8; HASH_LEN]> for Hash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Hash(bytes)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", to_hex(self))
    }
}

// The remote wants lowercase hex for every checksum
pub fn to_hex(hash: &Hash) -> String {
    hex::encode(hash.0)
}

pub fn from_hex(hash: &str) -> Result<Hash, hex::FromHexError> {
    let mut bytes = [0u8; HASH_LEN];
    hex::decode_to_slice(hash, &mut bytes)?;
    Ok(Hash(bytes))
}
